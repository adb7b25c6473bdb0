//! CLI error type and exit codes.

use std::fmt::{self, Display, Formatter};

/// Error surfaced to the user with a dedicated exit code.
#[derive(Debug)]
pub(crate) enum CliError {
    /// The task failed and every change was rolled back or is known to be irreversible.
    TaskFailed(String),
    /// The task failed and rollback left paths behind.
    RollbackIncomplete(String),
    /// Invalid arguments or configuration.
    Validation(String),
    /// Anything else.
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::TaskFailed(_) => 1,
            Self::RollbackIncomplete(_) => 2,
            Self::Validation(_) => 3,
            Self::Failure(_) => 4,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::TaskFailed(message)
            | Self::RollbackIncomplete(message)
            | Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn exit_codes_distinguish_rollback_failures() {
        assert_eq!(CliError::TaskFailed("x".into()).exit_code(), 1);
        assert_eq!(CliError::RollbackIncomplete("x".into()).exit_code(), 2);
        assert_eq!(CliError::validation("bad").exit_code(), 3);
        let failure = CliError::failure(anyhow!("outer").context("inner"));
        assert_eq!(failure.exit_code(), 4);
        assert_eq!(failure.display_message(), "inner: outer");
    }
}
