//! Status conditions for managed resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// The external resource is usable.
    Ready,
    /// The last reconcile of the managed resource succeeded.
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionReason {
    Available,
    Creating,
    Deleting,
    ReconcileSuccess,
    ReconcileError,
    ReconcilePaused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: ConditionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    fn new(type_: ConditionType, status: ConditionStatus, reason: ConditionReason) -> Self {
        Self {
            type_,
            status,
            reason,
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    pub fn available() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::True,
            ConditionReason::Available,
        )
    }

    pub fn creating() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            ConditionReason::Creating,
        )
    }

    pub fn deleting() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            ConditionReason::Deleting,
        )
    }

    pub fn reconcile_success() -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::True,
            ConditionReason::ReconcileSuccess,
        )
    }

    pub fn reconcile_error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(
                ConditionType::Synced,
                ConditionStatus::False,
                ConditionReason::ReconcileError,
            )
        }
    }

    pub fn reconcile_paused() -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::False,
            ConditionReason::ReconcilePaused,
        )
    }

    /// Equal in everything but the transition time.
    pub fn equivalent(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Conditions keyed by type; at most one condition per type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    /// Replace conditions of the same type. An equivalent condition keeps
    /// its original transition time.
    pub fn set(&mut self, conditions: impl IntoIterator<Item = Condition>) {
        for new in conditions {
            match self.0.iter_mut().find(|c| c.type_ == new.type_) {
                Some(existing) if existing.equivalent(&new) => {}
                Some(existing) => *existing = new,
                None => self.0.push(new),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }
}
