use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("insufficient data: need {need} bytes but only {have} remain")]
    InsufficientData { need: usize, have: usize },

    #[error("length field says {declared} bytes but message is {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("reply status {0} is out of range")]
    InvalidStatus(i32),

    #[error("error reply ({error}) carries {len} payload bytes")]
    ErrorWithPayload { error: i32, len: usize },

    #[error("message too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}
