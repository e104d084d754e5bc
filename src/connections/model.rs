use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connections::error::ConnectionError;

/// Closed status enum. UI/admin concerns (archived, hidden, reported)
/// never extend this; they live in the metadata overlay instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Declined,
    /// Reserved terminal state. Expiry is owned by an external scheduled
    /// job; no transition into or out of it exists in this engine.
    Expired,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Declined => "declined",
            ConnectionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConnectionError> {
        match s {
            "pending" => Ok(ConnectionStatus::Pending),
            "accepted" => Ok(ConnectionStatus::Accepted),
            "declined" => Ok(ConnectionStatus::Declined),
            "expired" => Ok(ConnectionStatus::Expired),
            other => Err(ConnectionError::Validation(format!(
                "Unknown connection status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Inquiry,
    Request,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Inquiry => "inquiry",
            ConnectionType::Request => "request",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConnectionError> {
        match s {
            "inquiry" => Ok(ConnectionType::Inquiry),
            "request" => Ok(ConnectionType::Request),
            other => Err(ConnectionError::Validation(format!(
                "Unknown connection type: {}",
                other
            ))),
        }
    }
}

/// Structured intake captured when a connection is created and editable
/// afterwards through `update_intent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub care_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub care_recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMessageKind {
    System,
    TimeProposal,
    TimeAccepted,
}

/// One entry in the embedded message history. Entries are immutable once
/// appended; the thread is ordered by commit order at the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub from_profile_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub kind: ThreadMessageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStepType {
    Call,
    Consultation,
    Visit,
}

impl ProposalStepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStepType::Call => "call",
            ProposalStepType::Consultation => "consultation",
            ProposalStepType::Visit => "visit",
        }
    }
}

/// A candidate meeting slot. Date/time/timezone are opaque display
/// strings supplied by the client; the engine validates presence, not
/// calendar semantics, and never compares them to the wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedSlot {
    pub date: String,
    pub time: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Accepted,
}

/// At most one proposal lives on a connection at a time. A new proposal
/// replaces the prior one wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeProposal {
    pub id: Uuid,
    pub from_profile_id: Uuid,
    pub step_type: ProposalStepType,
    pub slots: Vec<ProposedSlot>,
    pub status: ProposalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_slot_index: Option<usize>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledCallStatus {
    Confirmed,
}

/// Derived from an accepted proposal; always confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledCall {
    pub step_type: ProposalStepType,
    pub date: String,
    pub time: String,
    pub timezone: String,
    pub proposed_by: Uuid,
    pub confirmed_at: DateTime<Utc>,
    pub status: ScheduledCallStatus,
}

/// Snapshot taken when a connection is archived. `from_status` can be
/// absent on rows archived before snapshotting existed; logical status
/// falls back to accepted on unarchive in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<ConnectionStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub by: Uuid,
    pub at: DateTime<Utc>,
}

/// A standing ask from one participant for a next step. Created by the
/// inbox surface, not by this engine; the negotiation protocol clears it
/// when a proposal is accepted and preserves it on decline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextStepRequest {
    pub step_type: ProposalStepType,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
}

/// Extensible state layered beside, never inside, the status enum. One
/// shared blob per connection: both participants observe the same flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<ArchiveSnapshot>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportRecord>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub viewed: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub provider_initiated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_intro: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thread: Vec<ThreadMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_proposal: Option<TimeProposal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_call: Option<ScheduledCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_request: Option<NextStepRequest>,
}

/// The central entity: a directed relationship between two profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub connection_type: ConnectionType,
    pub status: ConnectionStatus,
    pub from_profile_id: Uuid,
    pub to_profile_id: Uuid,
    pub message: IntakeMessage,
    pub metadata: ConnectionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    pub fn is_participant(&self, profile_id: Uuid) -> bool {
        self.from_profile_id == profile_id || self.to_profile_id == profile_id
    }

    /// Append to the embedded thread. Entries are never edited or removed
    /// afterwards.
    pub fn append_thread(&mut self, from_profile_id: Uuid, text: impl Into<String>, kind: ThreadMessageKind, now: DateTime<Utc>) {
        self.metadata.thread.push(ThreadMessage {
            from_profile_id,
            text: text.into(),
            created_at: now,
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ConnectionStatus::Pending,
            ConnectionStatus::Accepted,
            ConnectionStatus::Declined,
            ConnectionStatus::Expired,
        ] {
            assert_eq!(ConnectionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ConnectionStatus::parse("archived").is_err());
    }

    #[test]
    fn metadata_defaults_serialize_to_empty_object() {
        let metadata = ConnectionMetadata::default();
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn metadata_survives_json_round_trip() {
        let mut metadata = ConnectionMetadata::default();
        metadata.provider_initiated = true;
        metadata.match_reasons = vec!["dementia care".to_string()];
        metadata.archived = Some(ArchiveSnapshot {
            from_status: Some(ConnectionStatus::Accepted),
        });

        let value = serde_json::to_value(&metadata).unwrap();
        let back: ConnectionMetadata = serde_json::from_value(value).unwrap();
        assert!(back.provider_initiated);
        assert_eq!(back.match_reasons, metadata.match_reasons);
        assert_eq!(
            back.archived.unwrap().from_status,
            Some(ConnectionStatus::Accepted)
        );
    }

    #[test]
    fn unknown_metadata_keys_are_tolerated() {
        // Rows written by older revisions may carry extra keys.
        let value = serde_json::json!({ "viewed": true, "legacy_flag": 1 });
        let metadata: ConnectionMetadata = serde_json::from_value(value).unwrap();
        assert!(metadata.viewed);
    }
}
