use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connections::error::ConnectionError;
use crate::connections::model::{
    ArchiveSnapshot, Connection, ConnectionStatus, ReportRecord,
};

/// Overlay operations accepted by `set_overlay_flag`. All of them touch
/// metadata only; the status column is never written here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayAction {
    Archive,
    Unarchive,
    Hide,
    Report,
}

/// What consumers should display. `status` alone is wrong whenever the
/// record is archived; every read path goes through this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Archived,
}

impl From<ConnectionStatus> for LogicalStatus {
    fn from(status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Pending => LogicalStatus::Pending,
            ConnectionStatus::Accepted => LogicalStatus::Accepted,
            ConnectionStatus::Declined => LogicalStatus::Declined,
            ConnectionStatus::Expired => LogicalStatus::Expired,
        }
    }
}

pub fn logical_status(connection: &Connection) -> LogicalStatus {
    if connection.metadata.archived.is_some() {
        LogicalStatus::Archived
    } else {
        connection.status.into()
    }
}

/// Apply an overlay action to an in-memory record and report the
/// resulting logical status. The status column is untouched in every arm.
pub fn apply_overlay_action(
    connection: &mut Connection,
    actor: Uuid,
    action: OverlayAction,
    report_reason: Option<String>,
    report_details: Option<String>,
    now: DateTime<Utc>,
) -> Result<LogicalStatus, ConnectionError> {
    match action {
        OverlayAction::Archive => {
            connection.metadata.archived = Some(ArchiveSnapshot {
                from_status: Some(connection.status),
            });
        }
        OverlayAction::Unarchive => {
            // The snapshot restores the logical status; rows archived
            // before snapshotting existed fall back to accepted.
            return Ok(match connection.metadata.archived.take() {
                Some(snapshot) => snapshot
                    .from_status
                    .unwrap_or(ConnectionStatus::Accepted)
                    .into(),
                None => connection.status.into(),
            });
        }
        OverlayAction::Hide => {
            connection.metadata.hidden = true;
        }
        OverlayAction::Report => {
            let reason = report_reason
                .filter(|r| !r.trim().is_empty())
                .ok_or_else(|| ConnectionError::validation("A report reason is required"))?;
            connection.metadata.report = Some(ReportRecord {
                reason,
                details: report_details,
                by: actor,
                at: now,
            });
            // Reporting implies archiving for the reporter, unconditionally.
            connection.metadata.archived = Some(ArchiveSnapshot {
                from_status: Some(connection.status),
            });
        }
    }
    Ok(logical_status(connection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::model::{
        ConnectionMetadata, ConnectionType, IntakeMessage,
    };

    fn accepted_connection() -> Connection {
        Connection {
            id: Uuid::new_v4(),
            connection_type: ConnectionType::Inquiry,
            status: ConnectionStatus::Accepted,
            from_profile_id: Uuid::new_v4(),
            to_profile_id: Uuid::new_v4(),
            message: IntakeMessage::default(),
            metadata: ConnectionMetadata::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn archive_snapshots_status_without_changing_it() {
        let mut connection = accepted_connection();
        let actor = connection.from_profile_id;
        let logical =
            apply_overlay_action(&mut connection, actor, OverlayAction::Archive, None, None, Utc::now())
                .unwrap();

        assert_eq!(logical, LogicalStatus::Archived);
        assert_eq!(connection.status, ConnectionStatus::Accepted);
        assert_eq!(
            connection.metadata.archived.as_ref().unwrap().from_status,
            Some(ConnectionStatus::Accepted)
        );
    }

    #[test]
    fn archived_is_shared_between_both_participants() {
        // The overlay is one shared blob, not per-participant state: once
        // either side archives, both sides resolve to archived.
        let mut connection = accepted_connection();
        let archiver = connection.from_profile_id;
        apply_overlay_action(&mut connection, archiver, OverlayAction::Archive, None, None, Utc::now())
            .unwrap();
        assert_eq!(logical_status(&connection), LogicalStatus::Archived);
    }

    #[test]
    fn unarchive_restores_snapshotted_status() {
        let mut connection = accepted_connection();
        connection.status = ConnectionStatus::Declined;
        let actor = connection.to_profile_id;
        apply_overlay_action(&mut connection, actor, OverlayAction::Archive, None, None, Utc::now())
            .unwrap();
        let logical =
            apply_overlay_action(&mut connection, actor, OverlayAction::Unarchive, None, None, Utc::now())
                .unwrap();
        assert_eq!(logical, LogicalStatus::Declined);
        assert!(connection.metadata.archived.is_none());
    }

    #[test]
    fn unarchive_without_snapshot_falls_back_to_accepted() {
        let mut connection = accepted_connection();
        connection.metadata.archived = Some(ArchiveSnapshot { from_status: None });
        let actor = connection.to_profile_id;
        let logical =
            apply_overlay_action(&mut connection, actor, OverlayAction::Unarchive, None, None, Utc::now())
                .unwrap();
        assert_eq!(logical, LogicalStatus::Accepted);
    }

    #[test]
    fn unarchive_on_a_live_record_reports_its_real_status() {
        let mut connection = accepted_connection();
        connection.status = ConnectionStatus::Pending;
        let actor = connection.from_profile_id;
        let logical =
            apply_overlay_action(&mut connection, actor, OverlayAction::Unarchive, None, None, Utc::now())
                .unwrap();
        assert_eq!(logical, LogicalStatus::Pending);
    }

    #[test]
    fn hide_sets_the_flag_and_nothing_else() {
        let mut connection = accepted_connection();
        let actor = connection.from_profile_id;
        let logical =
            apply_overlay_action(&mut connection, actor, OverlayAction::Hide, None, None, Utc::now())
                .unwrap();
        assert!(connection.metadata.hidden);
        assert_eq!(logical, LogicalStatus::Accepted);
        assert_eq!(connection.status, ConnectionStatus::Accepted);
    }

    #[test]
    fn report_requires_a_reason() {
        let mut connection = accepted_connection();
        let actor = connection.from_profile_id;
        let err = apply_overlay_action(
            &mut connection,
            actor,
            OverlayAction::Report,
            Some("   ".to_string()),
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ConnectionError::Validation(_)));
        assert!(connection.metadata.report.is_none());
    }

    #[test]
    fn report_always_archives_even_when_already_archived() {
        let mut connection = accepted_connection();
        let actor = connection.to_profile_id;
        apply_overlay_action(&mut connection, actor, OverlayAction::Archive, None, None, Utc::now())
            .unwrap();
        apply_overlay_action(
            &mut connection,
            actor,
            OverlayAction::Report,
            Some("misleading listing".to_string()),
            Some("claims unlicensed services".to_string()),
            Utc::now(),
        )
        .unwrap();

        assert!(connection.metadata.archived.is_some());
        let report = connection.metadata.report.as_ref().unwrap();
        assert_eq!(report.reason, "misleading listing");
        assert_eq!(report.by, actor);
        // Still only metadata: the status column is untouched.
        assert_eq!(connection.status, ConnectionStatus::Accepted);
    }
}
