use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::protocol::Product;

/// Viewer choices that survive a restart.
///
/// Unset fields fall back to the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentState {
    #[serde(default)]
    pub last_product: Option<Product>,
    #[serde(default)]
    pub opacity: Option<f32>,
}

pub struct StateStore {
    state_file: PathBuf,
}

impl StateStore {
    pub fn new(state_file: PathBuf) -> Self {
        Self { state_file }
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    /// Missing or unreadable state is not an error; start from defaults.
    pub fn load(&self) -> PersistentState {
        if let Ok(content) = std::fs::read_to_string(&self.state_file) {
            if let Ok(persistent) = serde_json::from_str::<PersistentState>(&content) {
                return persistent;
            }
            tracing::warn!("ignoring unreadable state file {:?}", self.state_file);
        }
        PersistentState::default()
    }

    pub async fn save(&self, state: &PersistentState) -> anyhow::Result<()> {
        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&self.state_file, json).await?;
        Ok(())
    }
}
