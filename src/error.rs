//! Crate-wide error type.

/// Failures raised by construction or by out-of-range access.
///
/// Runtime degeneracies encountered mid-tick (a search range collapsing,
/// a parabolic denominator near zero) are never represented here — they
/// are recovered locally by falling back to an unrefined estimate.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
  #[error("invalid argument: {0}")]
  InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
