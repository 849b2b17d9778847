use crate::hash::Hash;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while identifying or reading a layer.
///
/// Nothing in this crate retries or logs these; they go straight back to
/// the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The source stream failed while being hashed.
    #[error("hash computation failed: {0}")]
    HashComputationFailed(#[source] io::Error),

    /// A layer stream could not be opened.
    #[error("layer source unavailable: {0}")]
    SourceUnavailable(#[source] io::Error),

    #[error("invalid hash {0:?}, expected algorithm:hex")]
    InvalidHash(String),

    /// The bytes of a stream do not hash to what the layer claims.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Hash, actual: Hash },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("layer cache: {0}")]
    Cache(String),

    #[error("archiving layer failed: {0}")]
    Archive(#[source] io::Error),
}

impl Error {
    /// True for failures of the underlying content rather than of the
    /// layer's identity.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Error::HashComputationFailed(_) | Error::SourceUnavailable(_) | Error::Archive(_)
        )
    }
}
