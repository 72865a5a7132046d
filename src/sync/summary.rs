// src/sync/summary.rs
use serde::{Deserialize, Serialize};

use crate::model::{CallId, CallStatus};

/// Store operations performed by one run, for external auditing.
/// External fetches count as reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCounts {
    pub read: u64,
    pub create: u64,
    pub update: u64,
    pub delete: u64,
}

/// Published outcome of one sync run (`run-summary`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Category tag ("weather", "earthquake"), or the requested name when
    /// the source could not be resolved.
    pub source: String,
    pub source_name: String,
    pub call_id: Option<CallId>,
    pub status: Option<CallStatus>,
    #[serde(flatten)]
    pub ops: OpCounts,
    pub success: usize,
    pub failed: usize,
    /// Secondary transfer pipeline; not implemented, always `false`.
    pub transfer_status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn completed(
        source: &str,
        source_name: &str,
        call_id: CallId,
        status: CallStatus,
        ops: OpCounts,
        success: usize,
        failed: usize,
    ) -> Self {
        Self {
            source: source.to_string(),
            source_name: source_name.to_string(),
            call_id: Some(call_id),
            status: Some(status),
            ops,
            success,
            failed,
            transfer_status: false,
            error: None,
        }
    }

    /// Zero-success summary for a run that could not complete.
    pub fn fatal(
        source: &str,
        source_name: &str,
        call_id: Option<CallId>,
        ops: OpCounts,
        failed: usize,
        error: String,
    ) -> Self {
        Self {
            source: source.to_string(),
            source_name: source_name.to_string(),
            call_id,
            status: call_id.map(|_| CallStatus::Failed),
            ops,
            success: 0,
            failed,
            transfer_status: false,
            error: Some(error),
        }
    }

    /// `PARTIAL` runs are successful runs with recorded failures.
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status == Some(CallStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattened_counts_and_optional_error() {
        let s = RunSummary::completed(
            "weather",
            "OpenWeather",
            CallId(3),
            CallStatus::Partial,
            OpCounts {
                read: 5,
                create: 4,
                update: 1,
                delete: 0,
            },
            2,
            1,
        );
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["read"], 5);
        assert_eq!(v["status"], "PARTIAL");
        assert_eq!(v["transfer_status"], false);
        assert!(v.get("error").is_none());
        assert!(!s.is_error());
    }

    #[test]
    fn fatal_without_call_has_no_status() {
        let s = RunSummary::fatal("Nope", "Nope", None, OpCounts::default(), 0, "gone".into());
        assert_eq!(s.status, None);
        assert_eq!(s.success, 0);
        assert!(s.is_error());
    }
}
