//! Ordered candidate loop shared by signature verification and decryption.
//!
//! Candidates are tried in order and the first success wins. Failures are
//! logged at debug level; only the last one is kept for the caller.

use tracing::debug;

use crate::error::SamlError;

/// Result of [`try_each`].
#[derive(Debug)]
pub enum Outcome<T> {
    /// A candidate succeeded.
    Success(T),
    /// No candidate succeeded.
    Exhausted {
        /// The error raised by the last failing candidate, if any failed.
        last_error: Option<SamlError>,
    },
}

impl<T> Outcome<T> {
    /// Converts into a result, mapping exhaustion through `on_exhausted`.
    ///
    /// # Errors
    ///
    /// Returns whatever `on_exhausted` produces.
    pub fn or_else<F>(self, on_exhausted: F) -> Result<T, SamlError>
    where
        F: FnOnce(Option<SamlError>) -> SamlError,
    {
        match self {
            Self::Success(value) => Ok(value),
            Self::Exhausted { last_error } => Err(on_exhausted(last_error)),
        }
    }
}

/// Tries `attempt` on each candidate in order.
///
/// `attempt` returns `Ok(Some(_))` on success, `Ok(None)` when the candidate
/// does not apply and `Err(_)` when it failed.
pub fn try_each<C, T, I, F>(what: &str, candidates: I, mut attempt: F) -> Outcome<T>
where
    I: IntoIterator<Item = C>,
    F: FnMut(C) -> Result<Option<T>, SamlError>,
{
    let mut last_error = None;
    for (index, candidate) in candidates.into_iter().enumerate() {
        match attempt(candidate) {
            Ok(Some(value)) => return Outcome::Success(value),
            Ok(None) => debug!(what, candidate = index, "candidate did not match"),
            Err(error) => {
                debug!(what, candidate = index, %error, "candidate failed");
                last_error = Some(error);
            }
        }
    }
    Outcome::Exhausted { last_error }
}
