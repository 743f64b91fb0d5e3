//! Types needed in multiple modules

/// Custom error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid configuration error (reported at construction; fatal)
    #[error("{0}")]
    InvalidConfig(String),
    /// Input vector/matrix does not match the declared sizes (caller contract bug)
    #[error("{0}")]
    ShapeMismatch(String),
    /// A normalisation row maximum was zero, indicating an impossible
    /// observation given the priors
    #[error("numeric underflow: {0}")]
    Underflow(String),
    /// File read/write error
    #[error("{0}")]
    FileReadWrite(#[from] std::io::Error),
    /// Serde read/write error
    #[error("{0}")]
    SerdeReadWrite(#[from] serde_json::Error),
}
