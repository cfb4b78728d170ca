use thiserror::Error;

/// Errors raised by tube and interval operations.
///
/// These are recoverable: the solver catches `NotBisectable` and retries
/// with another bisection time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TubeError {
    #[error("unable to bisect at t={t}: {reason}")]
    NotBisectable { t: f64, reason: String },

    #[error("t={t} lies outside the time domain [{lb}, {ub}]")]
    OutOfDomain { t: f64, lb: f64, ub: f64 },

    #[error("cannot build a tube from an empty list of slices")]
    EmptySlicing,

    #[error("expression error: {0}")]
    Parse(String),
}

impl TubeError {
    pub(crate) fn not_bisectable(t: f64, reason: impl Into<String>) -> Self {
        TubeError::NotBisectable {
            t,
            reason: reason.into(),
        }
    }
}
