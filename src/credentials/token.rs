use secrecy::{ExposeSecret, SecretString};

/// Decrypted bearer credential for one outbound call.
///
/// Wraps the plaintext in a [`SecretString`] so it is zeroized on drop and
/// never shows up in `Debug` output or log lines.
pub struct BearerToken(SecretString);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Plaintext value, for building an `Authorization` header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}
