//! Logging for errors that have nowhere to propagate.
//!
//! The execution walk runs in a detached task; a failed tracker write there
//! can only be logged. `ResultExt::log` records it with the caller location.

use std::fmt::Display;
use tracing::error;

pub trait ResultExt<T, E> {
    /// Log the error with `context` if this is an `Err`, returning `self` unchanged.
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            error!(
                target: "blackcross_playbook_engine",
                error = %e,
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_ok_passes_through() {
        let result: Result<i32, EngineError> = Ok(42);
        assert_eq!(result.log("finalize execution").unwrap(), 42);
    }

    #[test]
    fn test_err_passes_through() {
        let result: Result<i32, EngineError> =
            Err(EngineError::InvalidState("already completed".to_string()));
        let logged = result.log("finalize execution");
        assert!(matches!(logged, Err(EngineError::InvalidState(_))));
    }
}
