//! Short-circuiting step results.
//!
//! Executors run as a pipeline of steps. A step either hands its value to
//! the next one or stops the pipeline with a user-facing failure reason.
//! Fatal problems travel separately as [`ExecutorError`](crate::ExecutorError),
//! so a step returns `Result<Outcome<T>, ExecutorError>`.

/// Result of a single executor step.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome<T> {
    /// The step succeeded, continue with the value.
    Proceed(T),
    /// The step failed for a reason the user should see.
    Fail(String),
}

impl<T> Outcome<T> {
    /// Creates a failed outcome.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Proceed(_) => None,
            Self::Fail(reason) => Some(reason),
        }
    }
}

/// Unwraps an [`Outcome::Proceed`] value, or returns `Ok($on_fail)` from the
/// enclosing function with the failure reason bound to `$reason`.
#[macro_export]
macro_rules! proceed {
    ($outcome:expr, $reason:ident => $on_fail:expr) => {
        match $outcome {
            $crate::Outcome::Proceed(value) => value,
            $crate::Outcome::Fail($reason) => return Ok($on_fail),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason() {
        let out: Outcome<i32> = Outcome::Proceed(2);
        assert_eq!(out.failure_reason(), None);

        let out: Outcome<i32> = Outcome::fail("nope");
        assert_eq!(out, Outcome::Fail("nope".to_string()));
        assert_eq!(out.failure_reason(), Some("nope"));
    }

    #[test]
    fn test_proceed_macro() {
        fn step(input: Outcome<u8>) -> Result<Outcome<String>, ()> {
            let value = proceed!(input, reason => Outcome::Fail(reason));
            Ok(Outcome::Proceed(value.to_string()))
        }

        assert_eq!(step(Outcome::Proceed(7)), Ok(Outcome::Proceed("7".to_string())));
        assert_eq!(
            step(Outcome::fail("bad")),
            Ok(Outcome::Fail("bad".to_string()))
        );
    }
}
