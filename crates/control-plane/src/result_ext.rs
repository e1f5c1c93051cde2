//! Log-and-pass-through helper for `Result`.

use std::fmt::Display;
use tracing::error;

/// Adds [`ResultExt::log`] to `Result`.
pub trait ResultExt<T, E> {
    /// Log the error, with `context` and the caller's location, if this is
    /// an `Err`. The result is returned unchanged.
    ///
    /// ```ignore
    /// use kubefleet_control_plane::result_ext::ResultExt;
    ///
    /// let sink = sinks.open(&task.id).await.log("opening task log")?;
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            error!(
                target: "kubefleet_control_plane",
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
    use crate::error::AppError;

    #[test]
    fn test_log_passes_ok_through() {
        let result: Result<u32, AppError> = Ok(7);
        assert_eq!(result.log("reading task").unwrap(), 7);
    }

    #[test]
    fn test_log_passes_err_through() {
        let result: Result<u32, AppError> = Err(AppError::NotFound("task t1".into()));
        assert!(result.log("reading task").unwrap_err().is_not_found());
    }
}
