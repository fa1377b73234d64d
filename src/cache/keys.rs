//! Keys identifying a conditional capture for coalescing

use std::fmt;

use super::fingerprint::AddressFingerprint;

/// Whether the caller allowed cached data to be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMode {
    Conditional,
    Forced,
}

/// Identifies one logical capture: a project at a specific address.
///
/// Forced and conditional calls are kept apart so a forced refresh never
/// joins an in-flight call that may resolve from cache. Both modes share
/// the same [`FetchKey`] once they reach the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaptureKey {
    pub project_id: String,
    pub fingerprint: AddressFingerprint,
    pub mode: FetchMode,
}

impl CaptureKey {
    pub fn new(project_id: &str, fingerprint: AddressFingerprint, force_refresh: bool) -> Self {
        Self {
            project_id: project_id.to_string(),
            fingerprint,
            mode: if force_refresh {
                FetchMode::Forced
            } else {
                FetchMode::Conditional
            },
        }
    }
}

impl CaptureKey {
    pub fn fetch_key(&self) -> FetchKey {
        FetchKey {
            project_id: self.project_id.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// Identifies a pipeline fetch; at most one runs per project and address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub project_id: String,
    pub fingerprint: AddressFingerprint,
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch:{}:{}", self.project_id, self.fingerprint)
    }
}

impl fmt::Display for CaptureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            FetchMode::Conditional => "conditional",
            FetchMode::Forced => "forced",
        };
        write!(f, "capture:{}:{}:{}", self.project_id, self.fingerprint, mode)
    }
}
