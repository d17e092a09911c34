//! Event type vocabulary

use serde::{Deserialize, Serialize};

/// Every event type the core emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Run lifecycle
    RunCreated,
    RunStarted,
    RunWaitingInput,
    RunResumed,
    RunCancelled,
    RunFailed,
    RunCompleted,
    Interrupt,

    // Task execution
    TaskStarted,
    TaskProgress,
    TaskDone,
    TaskFailed,
    TaskRetrying,
    TaskBlocked,

    // Versioning
    ProductDocGenerated,
    ProductDocUpdated,
    ProductDocConfirmed,
    ProductDocOutdated,
    HistoryCreated,
    SnapshotCreated,
    PageCreated,
    PageVersionCreated,
    PagePreviewReady,

    // Graph nodes
    VerifyStart,
    VerifyPass,
    VerifyFail,
    BriefStart,
    BriefComplete,
    GenerateStart,
    GenerateProgress,
    GenerateComplete,
    RefineStart,
    RefineComplete,
    RefineWaiting,
    RegistryStart,
    RegistryComplete,
    StyleExtracted,

    // Agent envelope
    AgentStart,
    AgentProgress,
    AgentEnd,

    // Terminal
    Error,
    Done,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RunCreated => "run_created",
            EventType::RunStarted => "run_started",
            EventType::RunWaitingInput => "run_waiting_input",
            EventType::RunResumed => "run_resumed",
            EventType::RunCancelled => "run_cancelled",
            EventType::RunFailed => "run_failed",
            EventType::RunCompleted => "run_completed",
            EventType::Interrupt => "interrupt",
            EventType::TaskStarted => "task_started",
            EventType::TaskProgress => "task_progress",
            EventType::TaskDone => "task_done",
            EventType::TaskFailed => "task_failed",
            EventType::TaskRetrying => "task_retrying",
            EventType::TaskBlocked => "task_blocked",
            EventType::ProductDocGenerated => "product_doc_generated",
            EventType::ProductDocUpdated => "product_doc_updated",
            EventType::ProductDocConfirmed => "product_doc_confirmed",
            EventType::ProductDocOutdated => "product_doc_outdated",
            EventType::HistoryCreated => "history_created",
            EventType::SnapshotCreated => "snapshot_created",
            EventType::PageCreated => "page_created",
            EventType::PageVersionCreated => "page_version_created",
            EventType::PagePreviewReady => "page_preview_ready",
            EventType::VerifyStart => "verify_start",
            EventType::VerifyPass => "verify_pass",
            EventType::VerifyFail => "verify_fail",
            EventType::BriefStart => "brief_start",
            EventType::BriefComplete => "brief_complete",
            EventType::GenerateStart => "generate_start",
            EventType::GenerateProgress => "generate_progress",
            EventType::GenerateComplete => "generate_complete",
            EventType::RefineStart => "refine_start",
            EventType::RefineComplete => "refine_complete",
            EventType::RefineWaiting => "refine_waiting",
            EventType::RegistryStart => "registry_start",
            EventType::RegistryComplete => "registry_complete",
            EventType::StyleExtracted => "style_extracted",
            EventType::AgentStart => "agent_start",
            EventType::AgentProgress => "agent_progress",
            EventType::AgentEnd => "agent_end",
            EventType::Error => "error",
            EventType::Done => "done",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_as_str() {
        for event_type in [
            EventType::RunCreated,
            EventType::RunWaitingInput,
            EventType::TaskRetrying,
            EventType::ProductDocOutdated,
            EventType::PageVersionCreated,
            EventType::StyleExtracted,
            EventType::Done,
        ] {
            let serialized = serde_json::to_value(event_type).unwrap();
            assert_eq!(serialized, event_type.as_str());
        }
    }
}
