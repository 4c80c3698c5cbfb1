use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Bidirectional mapping between the labels of one target column and
/// dense codes `0..k`.
///
/// Classes are kept sorted, so a label's code is its rank among the
/// distinct labels seen at fit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    /// Target column this encoder belongs to
    target: String,

    /// Sorted, distinct labels
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit over every label observed for `target`
    pub fn fit<I, S>(target: &str, labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = labels
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();

        if classes.is_empty() {
            return Err(AppError::InvalidData(format!(
                "no labels to fit encoder for '{}'",
                target
            )));
        }

        Ok(Self {
            target: target.to_string(),
            classes: classes.into_iter().collect(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .is_ok()
    }

    /// Code for a label from the fitted vocabulary
    pub fn encode(&self, label: &str) -> Result<i32> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map(|idx| idx as i32)
            .map_err(|_| AppError::UnknownLabel {
                target: self.target.clone(),
                label: label.to_string(),
            })
    }

    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<i32>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// Label for a code; codes outside `0..k` fail
    pub fn decode(&self, code: i32) -> Result<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| self.classes.get(idx))
            .map(String::as_str)
            .ok_or_else(|| AppError::UnknownLabelCode {
                target: self.target.clone(),
                code: i64::from(code),
            })
    }
}
