//! Credential custody for linked accounts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       LinkManager                        │
//! │  - seals tokens before every upsert      │
//! │  - opens them per outbound call          │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CredentialCipher                   │
//! │  - AES-256-GCM                           │
//! │  - random nonce per envelope             │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       AccountStore                       │
//! │  - ciphertext only, keyed by chat user   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use gitlink::credentials::CredentialCipher;
//!
//! # fn main() -> anyhow::Result<()> {
//! let key = std::env::var("GITLINK_ENCRYPTION_KEY")?;
//! let cipher = CredentialCipher::from_base64_key(&key)?;
//!
//! let sealed = cipher.encrypt("gho_token")?;
//! assert_eq!(cipher.decrypt(&sealed)?, "gho_token");
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - Tokens are encrypted at rest with AES-256-GCM
//! - The master key lives in memory only (from env var)
//! - Changing the key makes every stored credential undecryptable; affected
//!   users are asked to relink

mod encryption;
mod token;

pub use encryption::{generate_key, validate_key, CredentialCipher, CryptoError};
pub use token::BearerToken;
