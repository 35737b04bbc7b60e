//! Where a library's content lives: a backend kind plus a backend-specific
//! locator (a filesystem path or a remote root folder id).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    GoogleDrive,
    OneDrive,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::GoogleDrive => "google_drive",
            BackendKind::OneDrive => "one_drive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(BackendKind::Local),
            "google_drive" => Some(BackendKind::GoogleDrive),
            "one_drive" => Some(BackendKind::OneDrive),
            _ => None,
        }
    }

    /// Whether this backend is throttled aggressively enough to need the
    /// request gate and path cache in front of it.
    pub fn is_rate_sensitive(&self) -> bool {
        matches!(self, BackendKind::GoogleDrive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub backend: BackendKind,
    /// Path for local sources, root folder id for remote drives
    pub locator: String,
}

impl SourceDescriptor {
    pub fn new(backend: BackendKind, locator: impl Into<String>) -> Self {
        Self {
            backend,
            locator: locator.into(),
        }
    }
}
