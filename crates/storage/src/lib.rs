use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub mod catalog;
pub mod directory;
pub mod preferences;

pub use catalog::{search_schools, BusRoute, CanteenPlan, FeeSchedule, Term, SCHOOLS};
pub use directory::SeededDirectory;
pub use preferences::FilePreferences;

pub const DATA_DIR_NAME: &str = "master_fees";

/// Per-user application data directory, e.g. `~/.local/share/master_fees`.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("unable to resolve local app data dir"))?;
    Ok(base.join(DATA_DIR_NAME))
}
