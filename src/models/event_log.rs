use serde::{Deserialize, Serialize};

/// Processing status of an audit-log entry. Entries move from `processing`
/// to a terminal status and are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Processing,
    Completed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Processing => "processing",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(EventStatus::Processing),
            "completed" => Some(EventStatus::Completed),
            "failed" => Some(EventStatus::Failed),
            _ => None,
        }
    }
}
