use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("invalid encoder setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: &'static str },
    #[error("tensor engine: {0}")]
    Tensor(String),
}

pub type EncodeResult<T, E = EncodeError> = core::result::Result<T, E>;
