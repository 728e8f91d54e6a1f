//! Encrypted connection-profile vault
//!
//! Profiles live in a local SQLite file; secrets are sealed with
//! AES-256-GCM under a key derived from the process-wide master secret
//! via Argon2id. A canary value written at first initialization lets
//! startup detect a changed master secret before any profile is touched.

pub mod crypto;
pub mod store;

pub use crypto::SecretCipher;
pub use store::{SaveConnection, Vault};
