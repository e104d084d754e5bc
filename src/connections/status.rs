use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connections::error::ConnectionError;
use crate::connections::model::{Connection, ConnectionStatus};

/// Actions accepted by `set_status`. Who may perform each is decided by
/// the authorization guard; this module only enforces state preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusAction {
    Accept,
    Decline,
    Reconsider,
    View,
}

/// Apply a status action to an in-memory record. Pure with respect to the
/// store: the caller persists the mutated record afterwards.
///
/// `expired` is terminal here; no action moves a connection into or out
/// of it. Expiry belongs to an external scheduled job.
pub fn apply_status_action(
    connection: &mut Connection,
    action: StatusAction,
    now: DateTime<Utc>,
) -> Result<(), ConnectionError> {
    match action {
        StatusAction::Accept => match connection.status {
            ConnectionStatus::Pending => {
                connection.status = ConnectionStatus::Accepted;
                connection.metadata.accepted_at = Some(now);
                Ok(())
            }
            other => Err(ConnectionError::invalid_state(format!(
                "Cannot accept a connection in status '{}'",
                other.as_str()
            ))),
        },
        StatusAction::Decline => match connection.status {
            ConnectionStatus::Pending => {
                connection.status = ConnectionStatus::Declined;
                connection.metadata.declined_at = Some(now);
                Ok(())
            }
            other => Err(ConnectionError::invalid_state(format!(
                "Cannot decline a connection in status '{}'",
                other.as_str()
            ))),
        },
        StatusAction::Reconsider => match connection.status {
            ConnectionStatus::Declined => {
                connection.status = ConnectionStatus::Pending;
                connection.metadata.declined_at = None;
                Ok(())
            }
            other => Err(ConnectionError::invalid_state(format!(
                "Cannot reconsider a connection in status '{}'",
                other.as_str()
            ))),
        },
        StatusAction::View => {
            // Idempotent; valid at any status and never changes it.
            connection.metadata.viewed = true;
            Ok(())
        }
    }
}
