use thiserror::Error;

/// Failures a caller of the secret store has to handle. Key persistence problems
/// are not represented here: they are logged and the store keeps serving from its
/// in-memory key for the rest of the process lifetime.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The required text input was empty.
    #[error("plaintext or envelope must not be empty")]
    InvalidInput,

    /// The envelope doesn't follow the `iv:tag:ciphertext` hex layout.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The authentication tag did not verify. The ciphertext was tampered with,
    /// corrupted, or produced under a different key. Plaintext is never returned
    /// in this case.
    #[error("ciphertext failed authentication")]
    AuthenticationFailure,
}

pub type Result<T> = std::result::Result<T, SecretError>;
