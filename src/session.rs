use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::models::OwnerId;

/// The wallet a user connected. Stands in for the wallet kit: no handshake,
/// just the address that scopes every query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub wallet_address: Option<OwnerId>,
}

impl Session {
    /// A missing file means nobody is connected.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => {
                let session = serde_json::from_str(&raw)?;
                debug!(path = %path.display(), "loaded session");
                Ok(session)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn connect(path: &Path, owner: OwnerId) -> anyhow::Result<Self> {
        let session = Self {
            wallet_address: Some(owner),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&session)?)?;
        Ok(session)
    }

    pub fn disconnect(path: &Path) -> anyhow::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
