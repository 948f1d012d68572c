use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The capability level granted to a credential.
#[derive(Debug, Default, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StorageScope {
    #[default]
    FullControl,
    ReadOnly,
    ReadWrite,
}

impl StorageScope {
    /// The canonical OAuth scope understood by the storage service.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::FullControl => "https://www.googleapis.com/auth/devstorage.full_control",
            Self::ReadOnly => "https://www.googleapis.com/auth/devstorage.read_only",
            Self::ReadWrite => "https://www.googleapis.com/auth/devstorage.read_write",
        }
    }
}
