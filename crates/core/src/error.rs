/// Errors raised while building a gateway classifier from configuration.
///
/// Malformed *hit* IPs are never errors; these only cover malformed
/// configuration, which should stop the process at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    /// A configured CIDR block could not be parsed.
    #[error("invalid CIDR block '{cidr}': {reason}")]
    InvalidCidr { cidr: String, reason: String },

    /// A configured User-Agent signature is empty or whitespace; it would
    /// match every hit.
    #[error("empty User-Agent signature at position {index}")]
    EmptySignature { index: usize },
}

/// The secure random source failed while generating a result identifier.
#[derive(Debug, thiserror::Error)]
#[error("secure random source failed: {0}")]
pub struct RidError(#[from] pub rand::Error);
