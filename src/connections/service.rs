use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connections::authz::{self, ConnectionAction};
use crate::connections::error::ConnectionError;
use crate::connections::intro::{self, IntroMode};
use crate::connections::model::{
    Connection, ConnectionMetadata, ConnectionType, IntakeMessage, ProposalStepType, ProposedSlot,
};
use crate::connections::negotiation::{self, ProposalResponse};
use crate::connections::overlay::{self, LogicalStatus, OverlayAction};
use crate::connections::status::{apply_status_action, StatusAction};
use crate::connections::store::{ConnectionStore, NewConnection};
use crate::database::DatabaseManager;
use crate::profiles::{PgProfileDirectory, ProfileDirectory, ProfileKind, ProfileSummary};

/// Bounded optimistic-lock retry before a conflict is surfaced.
const MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
pub struct CreateConnectionInput {
    pub to_profile_id: Uuid,
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub message: IntakeMessage,
    #[serde(default)]
    pub match_reasons: Vec<String>,
}

/// Partial intake edit; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct IntentPatch {
    pub care_type: Option<String>,
    pub care_recipient: Option<String>,
    pub urgency: Option<String>,
    pub additional_notes: Option<String>,
}

impl IntentPatch {
    fn apply(&self, message: &mut IntakeMessage) {
        if let Some(care_type) = &self.care_type {
            message.care_type = Some(care_type.clone());
        }
        if let Some(care_recipient) = &self.care_recipient {
            message.care_recipient = Some(care_recipient.clone());
        }
        if let Some(urgency) = &self.urgency {
            message.urgency = Some(urgency.clone());
        }
        if let Some(additional_notes) = &self.additional_notes {
            message.additional_notes = Some(additional_notes.clone());
        }
    }
}

/// The connection engine: every operation fetches the current record,
/// authorizes the caller, applies a transformation, and commits through
/// the store's compare-and-swap with bounded retry.
pub struct ConnectionService {
    store: ConnectionStore,
    profiles: Arc<dyn ProfileDirectory>,
}

impl ConnectionService {
    pub async fn new() -> Result<Self, ConnectionError> {
        let pool = DatabaseManager::pool().await?;
        Ok(Self {
            store: ConnectionStore::new(pool.clone()),
            profiles: Arc::new(PgProfileDirectory::new(pool)),
        })
    }

    /// Create a connection from the acting profile toward a recipient.
    /// The origin flow is derived from the sender's profile kind: a
    /// provider sender seeds a provider-initiated interest, a care-seeker
    /// sender opens an inquiry. Idempotent for duplicate pending pairs.
    pub async fn create_connection(
        &self,
        actor: Uuid,
        input: CreateConnectionInput,
    ) -> Result<Connection, ConnectionError> {
        if input.to_profile_id == actor {
            return Err(ConnectionError::validation(
                "A profile cannot connect to itself",
            ));
        }

        let sender = self.require_profile(actor).await?;
        self.require_profile(input.to_profile_id).await?;

        let mut metadata = ConnectionMetadata {
            match_reasons: input.match_reasons,
            ..ConnectionMetadata::default()
        };
        if sender.kind == ProfileKind::Provider {
            if input.connection_type != ConnectionType::Request {
                return Err(ConnectionError::validation(
                    "Provider-initiated interest must be sent as a request",
                ));
            }
            metadata.provider_initiated = true;
        }

        let outcome = self
            .store
            .create(NewConnection {
                from_profile_id: actor,
                to_profile_id: input.to_profile_id,
                connection_type: input.connection_type,
                message: input.message,
                metadata,
            })
            .await?;

        if !outcome.created {
            debug!(
                connection_id = %outcome.connection.id,
                "Reusing existing pending connection"
            );
        }
        Ok(outcome.connection)
    }

    /// Participant-only read; for provider-initiated connections the
    /// sending provider is denied even this.
    pub async fn get_connection(
        &self,
        id: Uuid,
        actor: Uuid,
    ) -> Result<Connection, ConnectionError> {
        let (connection, _) = self.store.fetch_required(id).await?;
        authz::require(&connection, actor, ConnectionAction::Read)?;
        Ok(connection)
    }

    pub async fn set_status(
        &self,
        id: Uuid,
        actor: Uuid,
        action: StatusAction,
    ) -> Result<Connection, ConnectionError> {
        let guard_action = match action {
            StatusAction::Accept => ConnectionAction::Accept,
            StatusAction::Decline => ConnectionAction::Decline,
            StatusAction::Reconsider => ConnectionAction::Reconsider,
            StatusAction::View => ConnectionAction::MarkViewed,
        };

        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let (mut connection, version) = self.store.fetch_required(id).await?;
            authz::require(&connection, actor, guard_action)?;

            apply_status_action(&mut connection, action, Utc::now())?;

            // Accepting enriches the record with a generated intro in the
            // same commit. Best-effort: a directory failure degrades to a
            // null intro rather than failing the accept.
            if action == StatusAction::Accept {
                connection.metadata.auto_intro = self.generate_intro(&connection).await;
            }

            if self.store.try_update(&connection, version).await? {
                return Ok(connection);
            }
            debug!(connection_id = %id, attempt, "Stale write rejected, retrying");
        }
        Err(conflict_after_retries())
    }

    pub async fn set_overlay_flag(
        &self,
        id: Uuid,
        actor: Uuid,
        action: OverlayAction,
        report_reason: Option<String>,
        report_details: Option<String>,
    ) -> Result<LogicalStatus, ConnectionError> {
        let guard_action = match action {
            OverlayAction::Archive => ConnectionAction::Archive,
            OverlayAction::Unarchive => ConnectionAction::Unarchive,
            OverlayAction::Hide => ConnectionAction::Hide,
            OverlayAction::Report => ConnectionAction::Report,
        };

        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let (mut connection, version) = self.store.fetch_required(id).await?;
            authz::require(&connection, actor, guard_action)?;

            let logical = overlay::apply_overlay_action(
                &mut connection,
                actor,
                action,
                report_reason.clone(),
                report_details.clone(),
                Utc::now(),
            )?;

            if self.store.try_update(&connection, version).await? {
                return Ok(logical);
            }
            debug!(connection_id = %id, attempt, "Stale write rejected, retrying");
        }
        Err(conflict_after_retries())
    }

    pub async fn propose_times(
        &self,
        id: Uuid,
        actor: Uuid,
        step_type: ProposalStepType,
        slots: Vec<ProposedSlot>,
    ) -> Result<Connection, ConnectionError> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let (mut connection, version) = self.store.fetch_required(id).await?;
            authz::require(&connection, actor, ConnectionAction::Propose)?;

            negotiation::apply_propose(&mut connection, actor, step_type, slots.clone(), Utc::now())?;

            if self.store.try_update(&connection, version).await? {
                return Ok(connection);
            }
            debug!(connection_id = %id, attempt, "Stale write rejected, retrying");
        }
        Err(conflict_after_retries())
    }

    pub async fn respond_to_proposal(
        &self,
        id: Uuid,
        actor: Uuid,
        response: ProposalResponse,
        accepted_slot_index: Option<usize>,
    ) -> Result<Connection, ConnectionError> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let (mut connection, version) = self.store.fetch_required(id).await?;
            authz::require(&connection, actor, ConnectionAction::Respond)?;

            negotiation::apply_respond(
                &mut connection,
                actor,
                response,
                accepted_slot_index,
                Utc::now(),
            )?;

            if self.store.try_update(&connection, version).await? {
                return Ok(connection);
            }
            debug!(connection_id = %id, attempt, "Stale write rejected, retrying");
        }
        Err(conflict_after_retries())
    }

    /// Merge partial intake fields and regenerate the auto intro from the
    /// updated fields. Identical input twice yields an identical intro.
    pub async fn update_intent(
        &self,
        id: Uuid,
        actor: Uuid,
        patch: IntentPatch,
    ) -> Result<Connection, ConnectionError> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let (mut connection, version) = self.store.fetch_required(id).await?;
            authz::require(&connection, actor, ConnectionAction::UpdateIntent)?;

            patch.apply(&mut connection.message);
            connection.metadata.auto_intro = self.generate_intro(&connection).await;

            if self.store.try_update(&connection, version).await? {
                return Ok(connection);
            }
            debug!(connection_id = %id, attempt, "Stale write rejected, retrying");
        }
        Err(conflict_after_retries())
    }

    /// Resolve the seeker/provider sides and run the generator. Any
    /// directory failure degrades to None with a warning.
    async fn generate_intro(&self, connection: &Connection) -> Option<String> {
        let provider_initiated = connection.metadata.provider_initiated;
        let (seeker_id, provider_id) = if provider_initiated {
            (connection.to_profile_id, connection.from_profile_id)
        } else {
            (connection.from_profile_id, connection.to_profile_id)
        };

        let seeker = match self.profiles.get(seeker_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) | Err(_) => {
                warn!(connection_id = %connection.id, "Intro generation skipped: seeker profile unavailable");
                return None;
            }
        };
        let provider = match self.profiles.get(provider_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) | Err(_) => {
                warn!(connection_id = %connection.id, "Intro generation skipped: provider profile unavailable");
                return None;
            }
        };

        let mode = if provider_initiated {
            IntroMode::ProviderOutreach {
                provider_name: &provider.display_name,
            }
        } else {
            IntroMode::Inquiry
        };
        Some(intro::generate(
            mode,
            &seeker.care_types,
            &provider.care_types,
            &connection.message,
        ))
    }

    async fn require_profile(&self, profile_id: Uuid) -> Result<ProfileSummary, ConnectionError> {
        self.profiles
            .get(profile_id)
            .await
            .map_err(|e| ConnectionError::validation(format!("Profile lookup failed: {}", e)))?
            .ok_or_else(|| {
                ConnectionError::validation(format!("Unknown profile: {}", profile_id))
            })
    }
}

fn conflict_after_retries() -> ConnectionError {
    ConnectionError::Conflict(
        "Connection was modified concurrently; giving up after retries".to_string(),
    )
}
