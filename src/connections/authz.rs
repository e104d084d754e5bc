use uuid::Uuid;

use crate::connections::error::ConnectionError;
use crate::connections::model::Connection;

/// How the connection came to exist. Authorization depends on this, not
/// just on which side of the edge the caller sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginFlow {
    /// Care-seeker reached out to a provider.
    Inquiry,
    /// Provider seeded interest toward a care-seeker. Response rights
    /// belong exclusively to the recipient.
    ProviderInitiatedInterest,
}

impl OriginFlow {
    pub fn of(connection: &Connection) -> Self {
        if connection.metadata.provider_initiated {
            OriginFlow::ProviderInitiatedInterest
        } else {
            OriginFlow::Inquiry
        }
    }
}

/// Everything a participant can ask the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    Read,
    Accept,
    Decline,
    Reconsider,
    MarkViewed,
    Archive,
    Unarchive,
    Hide,
    Report,
    Propose,
    Respond,
    UpdateIntent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capability {
    Allow,
    Deny,
}

/// The single authorization table. Non-participants are denied
/// everything; beyond that, what a participant may do depends on the
/// origin flow and which end of the edge they hold.
fn capability(connection: &Connection, actor: Uuid, action: ConnectionAction) -> Capability {
    use Capability::{Allow, Deny};
    use ConnectionAction::*;

    if !connection.is_participant(actor) {
        return Deny;
    }
    let is_recipient = actor == connection.to_profile_id;

    match OriginFlow::of(connection) {
        OriginFlow::Inquiry => match action {
            // Only the receiving side answers an inquiry.
            Accept | Decline => {
                if is_recipient {
                    Allow
                } else {
                    Deny
                }
            }
            // Reconsideration exists only for provider-initiated interest.
            Reconsider => Deny,
            Read | MarkViewed | Archive | Unarchive | Hide | Report | Propose | Respond
            | UpdateIntent => Allow,
        },
        OriginFlow::ProviderInitiatedInterest => match action {
            // The sending provider holds no response or view rights on
            // the record it seeded; the care-seeker does.
            Read | Accept | Decline | Reconsider | MarkViewed => {
                if is_recipient {
                    Allow
                } else {
                    Deny
                }
            }
            Archive | Unarchive | Hide | Report | Propose | Respond | UpdateIntent => Allow,
        },
    }
}

/// Guard entry point used by every engine operation.
pub fn require(
    connection: &Connection,
    actor: Uuid,
    action: ConnectionAction,
) -> Result<(), ConnectionError> {
    match capability(connection, actor, action) {
        Capability::Allow => Ok(()),
        Capability::Deny => Err(ConnectionError::AuthorizationDenied),
    }
}
