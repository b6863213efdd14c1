//! Revision status conditions.
//!
//! Four condition kinds, each a single boolean fact with a reason/message
//! pair, mirroring the condition-list convention of Kubernetes-style status
//! subresources. `ResourcesInSync` and `ResourcesOutOfSync` are treated as a
//! complementary pair: setting one true clears the other. `RevisionPublished`
//! and `RevisionTainted` are independent axes and are never auto-toggled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    RevisionPublished,
    RevisionTainted,
    ResourcesInSync,
    ResourcesOutOfSync,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::RevisionPublished => "RevisionPublished",
            ConditionType::RevisionTainted => "RevisionTainted",
            ConditionType::ResourcesInSync => "ResourcesInSync",
            ConditionType::ResourcesOutOfSync => "ResourcesOutOfSync",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub status: bool,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// The full condition set on a revision. Conditions are looked up by kind;
/// a kind absent from the list is treated as `status: false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevisionStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl RevisionStatus {
    pub fn is_true(&self, kind: ConditionType) -> bool {
        self.conditions.iter().any(|c| c.kind == kind && c.status)
    }

    /// Upsert a condition, bumping `last_transition_time` only when the
    /// boolean value actually changes (matching the monotone-within-a-pass,
    /// change-stamped semantics of a controller-runtime status patch).
    pub fn set(&mut self, kind: ConditionType, status: bool, reason: &str, message: &str, now: DateTime<Utc>) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.kind == kind) {
            if existing.status != status {
                existing.last_transition_time = now;
            }
            existing.status = status;
            existing.reason = reason.to_string();
            existing.message = message.to_string();
        } else {
            self.conditions.push(Condition {
                kind,
                status,
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
            });
        }
    }

    pub fn set_published(&mut self, published: bool, now: DateTime<Utc>) {
        self.set(
            ConditionType::RevisionPublished,
            published,
            if published { "Published" } else { "Unpublished" },
            "",
            now,
        );
    }

    pub fn set_tainted(&mut self, reason: &str, message: &str, now: DateTime<Utc>) {
        self.set(ConditionType::RevisionTainted, true, reason, message, now);
    }

    pub fn set_resources_in_sync(&mut self, now: DateTime<Utc>) {
        self.set(ConditionType::ResourcesInSync, true, "Reconciled", "", now);
        self.set(ConditionType::ResourcesOutOfSync, false, "Reconciled", "", now);
    }

    pub fn set_resources_out_of_sync(&mut self, reason: &str, message: &str, now: DateTime<Utc>) {
        self.set(ConditionType::ResourcesOutOfSync, true, reason, message, now);
        self.set(ConditionType::ResourcesInSync, false, reason, message, now);
    }
}
