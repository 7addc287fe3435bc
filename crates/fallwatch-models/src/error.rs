//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Detection label must not be empty")]
    EmptyLabel,

    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),
}
