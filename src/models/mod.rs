pub mod reading;
pub mod sample;

pub use reading::*;
pub use sample::*;
