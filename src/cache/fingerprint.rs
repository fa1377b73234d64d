//! Address fingerprinting.
//!
//! Fields are normalised (trimmed, whitespace collapsed, lower-cased) and
//! hashed under fixed labels, so the fingerprint depends only on field
//! content and not on how the caller built the value.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::AddressComponents;

const UNRESOLVED: &str = "unresolved";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressFingerprint(String);

impl AddressFingerprint {
    /// Fingerprint of an address with every field empty.
    pub fn unresolved() -> Self {
        Self(UNRESOLVED.to_string())
    }

    pub fn is_unresolved(&self) -> bool {
        self.0 == UNRESOLVED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AddressFingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AddressFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(field: &str) -> String {
    field
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hash an address into its fingerprint.
pub fn fingerprint(address: &AddressComponents) -> AddressFingerprint {
    let fields = [
        ("address", normalize(&address.address)),
        ("city", normalize(&address.city)),
        ("state", normalize(&address.state)),
        ("zip", normalize(&address.zip_code)),
    ];

    if fields.iter().all(|(_, value)| value.is_empty()) {
        return AddressFingerprint::unresolved();
    }

    let mut hasher = Sha256::new();
    for (label, value) in &fields {
        hasher.update(label.as_bytes());
        hasher.update(b"=");
        // Length prefix keeps "ab"+"c" distinct from "a"+"bc".
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
        hasher.update(b";");
    }
    AddressFingerprint(format!("{:x}", hasher.finalize()))
}
