use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::PreferenceStore;

pub const TUTORIAL_FLAG_KEY: &str = "has_seen_tutorial";

/// First-run tutorial check, consulted once when the flow starts.
pub struct TutorialGate {
    prefs: Arc<dyn PreferenceStore>,
}

impl TutorialGate {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { prefs }
    }

    /// An unreadable flag counts as unset.
    pub fn needs_tutorial(&self) -> bool {
        match self.prefs.load_flag(TUTORIAL_FLAG_KEY) {
            Ok(seen) => !seen.unwrap_or(false),
            Err(err) => {
                warn!(error = %err, "failed to read tutorial flag");
                true
            }
        }
    }

    pub fn mark_completed(&self) -> Result<()> {
        self.prefs.store_flag(TUTORIAL_FLAG_KEY, true)?;
        info!("tutorial marked as seen");
        Ok(())
    }
}
