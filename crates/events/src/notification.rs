use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockcast_core::TenantId;

/// What happened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PatternLearningCompleted,
    PatternLearningFailed,
    PatternIntegrationCompleted,
    PatternIntegrationFailed,
    PredictionGenerated,
    AccuracyReportGenerated,
}

impl NotificationKind {
    pub fn topic(&self) -> &'static str {
        match self {
            NotificationKind::PatternLearningCompleted => "patterns.learning.completed",
            NotificationKind::PatternLearningFailed => "patterns.learning.failed",
            NotificationKind::PatternIntegrationCompleted => "patterns.integration.completed",
            NotificationKind::PatternIntegrationFailed => "patterns.integration.failed",
            NotificationKind::PredictionGenerated => "predictions.generated",
            NotificationKind::AccuracyReportGenerated => "predictions.accuracy_report",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            NotificationKind::PatternLearningFailed | NotificationKind::PatternIntegrationFailed
        )
    }
}

/// Tenant-scoped notification envelope.
///
/// `payload` is free-form JSON (run id, counts, error message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    id: Uuid,
    tenant_id: TenantId,
    kind: NotificationKind,
    occurred_at: DateTime<Utc>,
    payload: JsonValue,
}

impl Notification {
    pub fn new(tenant_id: TenantId, kind: NotificationKind, payload: JsonValue) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            kind,
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topic_follows_kind() {
        let n = Notification::new(
            TenantId::new(),
            NotificationKind::PatternLearningFailed,
            json!({"error": "boom"}),
        );
        assert_eq!(n.topic(), "patterns.learning.failed");
        assert!(n.kind().is_failure());
    }
}
