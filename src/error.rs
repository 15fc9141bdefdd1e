//! Application error type.
//!
//! Every stage returns `Result<_, AppError>`. The exit code identifies the
//! failure category so scripts driving the pipeline can tell "fix the input
//! file" apart from "not enough years to fit".

/// Missing/unreadable input, unwritable output, invalid CLI value.
pub const EXIT_IO: u8 = 2;
/// Bytes not valid in the source's fixed encoding.
pub const EXIT_DECODE: u8 = 3;
/// Expected column, category, or row not found.
pub const EXIT_FORMAT: u8 = 4;
/// No overlapping years remain after the merge.
pub const EXIT_EMPTY: u8 = 5;
/// Not enough points for a statistic, or a singular regression.
pub const EXIT_INSUFFICIENT: u8 = 6;
/// Every figure failed to render.
pub const EXIT_RENDER: u8 = 7;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(EXIT_IO, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(EXIT_DECODE, message)
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(EXIT_FORMAT, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(EXIT_EMPTY, message)
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(EXIT_INSUFFICIENT, message)
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::new(EXIT_RENDER, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
