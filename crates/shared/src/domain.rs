use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(StudentId);
id_newtype!(ServiceId);

/// A named stage of the payment flow. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Search,
    Details,
    Services,
    History,
    Receipts,
    PayFees,
    AddServices,
    Checkout,
    Payment,
    Processing,
    Failed,
    Success,
    DownloadReceipt,
}

impl Step {
    pub const ALL: [Step; 13] = [
        Step::Search,
        Step::Details,
        Step::Services,
        Step::History,
        Step::Receipts,
        Step::PayFees,
        Step::AddServices,
        Step::Checkout,
        Step::Payment,
        Step::Processing,
        Step::Failed,
        Step::Success,
        Step::DownloadReceipt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Search => "search",
            Step::Details => "details",
            Step::Services => "services",
            Step::History => "history",
            Step::Receipts => "receipts",
            Step::PayFees => "pay-fees",
            Step::AddServices => "add-services",
            Step::Checkout => "checkout",
            Step::Payment => "payment",
            Step::Processing => "processing",
            Step::Failed => "failed",
            Step::Success => "success",
            Step::DownloadReceipt => "download-receipt",
        }
    }

    /// Outcome steps are only ever entered by replacing the top history frame.
    pub fn is_payment_outcome(self) -> bool {
        matches!(self, Step::Success | Step::Failed)
    }

    /// Location fragment used for frames of this step, e.g. `#pay-fees`.
    pub fn fragment(self) -> String {
        format!("#{}", self.as_str())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = FlowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let token = raw.trim().trim_start_matches('#');
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == token)
            .ok_or_else(|| FlowError::UnknownStep(raw.to_string()))
    }
}

/// Perceived direction of a transition, for animation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Back,
}

impl Direction {
    pub const ENTER_DURATION_MS: u32 = 400;
    pub const EXIT_DURATION_MS: u32 = 300;

    /// Horizontal offset (percent of width) the entering view starts from.
    pub fn enter_offset(self) -> i32 {
        match self {
            Direction::Forward => 100,
            Direction::Back => -100,
        }
    }

    /// Horizontal offset (percent of width) the leaving view slides to.
    pub fn exit_offset(self) -> i32 {
        -self.enter_offset()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Back => f.write_str("back"),
        }
    }
}

/// Payload attached to every history frame the flow creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: Step,
}

impl HistoryEntry {
    pub fn new(step: Step) -> Self {
        Self { step }
    }

    pub fn to_state(self) -> Value {
        serde_json::json!({ "step": self.step.as_str() })
    }

    /// Decodes a frame state. Anything that is not an object carrying a known
    /// `step` token yields `None`.
    pub fn from_state(state: &Value) -> Option<Self> {
        serde_json::from_value(state.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_step_token_and_fragment() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().expect("token"), step);
            assert_eq!(step.fragment().parse::<Step>().expect("fragment"), step);
        }
    }

    #[test]
    fn rejects_unknown_step_token() {
        let err = "refunds".parse::<Step>().expect_err("unknown");
        assert!(matches!(err, FlowError::UnknownStep(token) if token == "refunds"));
    }

    #[test]
    fn history_entry_state_uses_kebab_case_token() {
        let state = HistoryEntry::new(Step::DownloadReceipt).to_state();
        assert_eq!(state, serde_json::json!({ "step": "download-receipt" }));
        assert_eq!(
            HistoryEntry::from_state(&state),
            Some(HistoryEntry::new(Step::DownloadReceipt))
        );
    }

    #[test]
    fn foreign_frame_states_are_not_entries() {
        assert_eq!(HistoryEntry::from_state(&Value::Null), None);
        assert_eq!(
            HistoryEntry::from_state(&serde_json::json!({ "page": "details" })),
            None
        );
        assert_eq!(
            HistoryEntry::from_state(&serde_json::json!({ "step": "nowhere" })),
            None
        );
    }

    #[test]
    fn direction_offsets_mirror_each_other() {
        assert_eq!(Direction::Forward.enter_offset(), 100);
        assert_eq!(Direction::Forward.exit_offset(), -100);
        assert_eq!(Direction::Back.enter_offset(), -100);
        assert_eq!(Direction::Back.exit_offset(), 100);
    }
}
