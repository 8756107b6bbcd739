use serde::{Deserialize, Serialize};

/// The intended use for a key or algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum Usage {
    /// Intended for signing and verification
    #[serde(rename = "sig")]
    Signing,

    /// Intended for encryption
    #[serde(rename = "enc")]
    Encryption,
}
