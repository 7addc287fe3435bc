//! Request handlers.

pub mod cameras;
pub mod detect;
pub mod health;
pub mod video;

pub use cameras::*;
pub use detect::{detect, DetectRequest};
pub use health::*;
pub use video::*;
