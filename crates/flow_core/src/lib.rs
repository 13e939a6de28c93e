use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use anyhow::{anyhow, Result};
use shared::records::Student;

pub mod cart;
pub mod controller;
pub mod history;
pub mod receipt;
pub mod session;
pub mod step_graph;
pub mod transition;
pub mod tutorial;

pub use cart::{CartLine, ServiceCart};
pub use controller::{
    FlowAction, FlowController, FlowSnapshot, Lifecycle, SharedFlowController, WeakFlowController,
};
pub use history::{
    Frame, HistoryBackend, HistoryMode, HistorySynchronizer, MemoryHistory, MissingHistory,
    PopEvent, PopSubscription,
};
pub use receipt::{ReceiptDraft, ReceiptRenderer};
pub use session::{normalize_phone, SessionData, SessionStore};
pub use step_graph::StepGraph;
pub use transition::{Transition, TransitionDirector, TransitionOrigin};
pub use tutorial::{TutorialGate, TUTORIAL_FLAG_KEY};

pub const DEFAULT_SERVICE_FEE_BPS: u32 = 200;
pub const DEFAULT_SCHOOL_NAME: &str = "Twalumbu Educational Center";

/// Knobs the embedding application sets once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOptions {
    /// Only accept a deep-linked step when it is enterable with an empty
    /// session; otherwise any member of the closed step set is accepted.
    pub strict_deep_links: bool,
    /// Skip the first-run tutorial gate entirely.
    pub skip_tutorial: bool,
    pub service_fee_bps: u32,
    /// School printed on receipts when none is selected.
    pub fallback_school: String,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            strict_deep_links: false,
            skip_tutorial: false,
            service_fee_bps: DEFAULT_SERVICE_FEE_BPS,
            fallback_school: DEFAULT_SCHOOL_NAME.to_string(),
        }
    }
}

/// Lookup of the students a guardian's phone number is registered for.
pub trait StudentDirectory: Send + Sync {
    fn students_for_phone(&self, phone: &str) -> Vec<Student>;

    fn guardian_name(&self, _phone: &str) -> Option<String> {
        None
    }
}

pub struct MissingStudentDirectory;

impl StudentDirectory for MissingStudentDirectory {
    fn students_for_phone(&self, _phone: &str) -> Vec<Student> {
        Vec::new()
    }
}

/// Persisted boolean preferences that outlive a single session.
pub trait PreferenceStore: Send + Sync {
    fn load_flag(&self, key: &str) -> Result<Option<bool>>;
    fn store_flag(&self, key: &str, value: bool) -> Result<()>;
}

pub struct MissingPreferenceStore;

impl PreferenceStore for MissingPreferenceStore {
    fn load_flag(&self, key: &str) -> Result<Option<bool>> {
        Err(anyhow!("preference store unavailable while loading '{key}'"))
    }

    fn store_flag(&self, key: &str, _value: bool) -> Result<()> {
        Err(anyhow!("preference store unavailable while storing '{key}'"))
    }
}

/// Process-local preferences; forgotten when the process exits.
#[derive(Default)]
pub struct EphemeralPreferences {
    flags: Mutex<HashMap<String, bool>>,
}

impl PreferenceStore for EphemeralPreferences {
    fn load_flag(&self, key: &str) -> Result<Option<bool>> {
        let flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(flags.get(key).copied())
    }

    fn store_flag(&self, key: &str, value: bool) -> Result<()> {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}
