//! Application error type.
//!
//! Every fallible library call returns `Result<_, AppError>`. The exit code
//! groups failures for the binary:
//!
//! - `2`: input, configuration, network or filesystem problems
//! - `3`: data problems (unknown event, unusable strain)
//! - `4`: numerical problems (filter design, non-finite results)

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

    /// Bad flags, unreadable files, HTTP failures.
    pub fn input(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    /// Strain or catalog content that cannot be analyzed.
    pub fn data(message: impl Into<String>) -> Self {
        Self::new(3, message)
    }

    /// Numerical failure inside DSP or fitting code.
    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(4, message)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_carry_exit_codes() {
        assert_eq!(AppError::input("x").exit_code(), 2);
        assert_eq!(AppError::data("x").exit_code(), 3);
        assert_eq!(AppError::numeric("x").exit_code(), 4);
        assert_eq!(AppError::numeric("bad filter").to_string(), "bad filter");
    }
}
