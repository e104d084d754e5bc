use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connections::error::ConnectionError;
use crate::connections::model::{
    Connection, ConnectionStatus, ProposalStatus, ProposalStepType, ProposedSlot, ScheduledCall,
    ScheduledCallStatus, ThreadMessageKind, TimeProposal,
};

pub const MAX_PROPOSAL_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalResponse {
    Accept,
    Decline,
}

/// Presence-only validation: 1 to 3 slots, each with a date, time, and
/// timezone. Calendar semantics are not checked and slots in the past are
/// deliberately not rejected.
pub fn validate_slots(slots: &[ProposedSlot]) -> Result<(), ConnectionError> {
    if slots.is_empty() {
        return Err(ConnectionError::validation(
            "At least one time slot is required",
        ));
    }
    if slots.len() > MAX_PROPOSAL_SLOTS {
        return Err(ConnectionError::validation(format!(
            "At most {} time slots may be proposed",
            MAX_PROPOSAL_SLOTS
        )));
    }
    for (index, slot) in slots.iter().enumerate() {
        if slot.date.trim().is_empty()
            || slot.time.trim().is_empty()
            || slot.timezone.trim().is_empty()
        {
            return Err(ConnectionError::validation(format!(
                "Slot {} must include a date, time, and timezone",
                index + 1
            )));
        }
    }
    Ok(())
}

fn format_slot(slot: &ProposedSlot) -> String {
    format!("{} at {} ({})", slot.date, slot.time, slot.timezone)
}

/// Replace any live proposal with a fresh one (last-proposal-wins) and
/// append exactly one thread entry describing the offered slots.
pub fn apply_propose(
    connection: &mut Connection,
    actor: Uuid,
    step_type: ProposalStepType,
    slots: Vec<ProposedSlot>,
    now: DateTime<Utc>,
) -> Result<(), ConnectionError> {
    if connection.status != ConnectionStatus::Accepted {
        return Err(ConnectionError::invalid_state(format!(
            "Times can only be proposed on an accepted connection (status is '{}')",
            connection.status.as_str()
        )));
    }
    validate_slots(&slots)?;

    let offered = slots
        .iter()
        .map(format_slot)
        .collect::<Vec<_>>()
        .join("; ");
    connection.append_thread(
        actor,
        format!("Proposed {} times: {}", step_type.as_str(), offered),
        ThreadMessageKind::TimeProposal,
        now,
    );

    connection.metadata.time_proposal = Some(TimeProposal {
        id: Uuid::new_v4(),
        from_profile_id: actor,
        step_type,
        slots,
        status: ProposalStatus::Pending,
        accepted_slot_index: None,
        created_at: now,
        resolved_at: None,
    });
    Ok(())
}

/// Accept or decline the live proposal. Accepting derives a confirmed
/// scheduled call from the chosen slot and clears any standing next-step
/// request; declining drops the proposal and leaves the next-step request
/// in place for re-proposal.
pub fn apply_respond(
    connection: &mut Connection,
    actor: Uuid,
    response: ProposalResponse,
    accepted_slot_index: Option<usize>,
    now: DateTime<Utc>,
) -> Result<(), ConnectionError> {
    let proposal = match connection.metadata.time_proposal.as_ref() {
        Some(p) if p.status == ProposalStatus::Pending => p.clone(),
        _ => {
            return Err(ConnectionError::invalid_state(
                "No active time proposal to respond to",
            ))
        }
    };

    match response {
        ProposalResponse::Accept => {
            let index = accepted_slot_index.ok_or_else(|| {
                ConnectionError::validation("accepted_slot_index is required to accept")
            })?;
            let slot = proposal.slots.get(index).ok_or_else(|| {
                ConnectionError::validation(format!(
                    "accepted_slot_index {} is out of range for {} slot(s)",
                    index,
                    proposal.slots.len()
                ))
            })?;

            connection.metadata.scheduled_call = Some(ScheduledCall {
                step_type: proposal.step_type,
                date: slot.date.clone(),
                time: slot.time.clone(),
                timezone: slot.timezone.clone(),
                proposed_by: proposal.from_profile_id,
                confirmed_at: now,
                status: ScheduledCallStatus::Confirmed,
            });
            connection.metadata.next_step_request = None;

            let confirmed_text = format!(
                "Confirmed {} on {}",
                proposal.step_type.as_str(),
                format_slot(slot)
            );
            connection.metadata.time_proposal = Some(TimeProposal {
                status: ProposalStatus::Accepted,
                accepted_slot_index: Some(index),
                resolved_at: Some(now),
                ..proposal
            });
            connection.append_thread(actor, confirmed_text, ThreadMessageKind::TimeAccepted, now);
        }
        ProposalResponse::Decline => {
            connection.metadata.time_proposal = None;
            connection.append_thread(
                actor,
                format!("Declined the proposed {} times", proposal.step_type.as_str()),
                ThreadMessageKind::System,
                now,
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::model::{
        ConnectionMetadata, ConnectionType, IntakeMessage, NextStepRequest,
    };

    fn slot(date: &str, time: &str) -> ProposedSlot {
        ProposedSlot {
            date: date.to_string(),
            time: time.to_string(),
            timezone: "America/Chicago".to_string(),
        }
    }

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
    fn slots_must_be_one_to_three() {
        assert!(validate_slots(&[]).is_err());
        assert!(validate_slots(&[slot("Jun 3", "10:00 AM")]).is_ok());
        let four = vec![
            slot("Jun 3", "10:00 AM"),
            slot("Jun 4", "10:00 AM"),
            slot("Jun 5", "10:00 AM"),
            slot("Jun 6", "10:00 AM"),
        ];
        assert!(validate_slots(&four).is_err());
    }

    #[test]
    fn slots_require_every_field() {
        let mut bad = slot("Jun 3", "10:00 AM");
        bad.timezone = "".to_string();
        let err = validate_slots(&[bad]).unwrap_err();
        assert!(matches!(err, ConnectionError::Validation(_)));
    }

    #[test]
    fn propose_requires_accepted_status() {
        let mut connection = accepted_connection();
        connection.status = ConnectionStatus::Pending;
        let proposer = connection.from_profile_id;
        let err = apply_propose(
            &mut connection,
            proposer,
            ProposalStepType::Call,
            vec![slot("Jun 3", "10:00 AM")],
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidState(_)));
    }

    #[test]
    fn propose_stores_pending_proposal_and_one_thread_entry() {
        let mut connection = accepted_connection();
        let proposer = connection.from_profile_id;
        apply_propose(
            &mut connection,
            proposer,
            ProposalStepType::Call,
            vec![slot("Jun 3", "10:00 AM"), slot("Jun 4", "2:30 PM")],
            Utc::now(),
        )
        .unwrap();

        let proposal = connection.metadata.time_proposal.as_ref().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert_eq!(proposal.from_profile_id, proposer);
        assert_eq!(proposal.slots.len(), 2);
        assert_eq!(connection.metadata.thread.len(), 1);
        assert_eq!(
            connection.metadata.thread[0].kind,
            ThreadMessageKind::TimeProposal
        );
        assert!(connection.metadata.thread[0].text.contains("Jun 3 at 10:00 AM"));
    }

    #[test]
    fn second_propose_replaces_rather_than_merges() {
        let mut connection = accepted_connection();
        let proposer = connection.from_profile_id;
        apply_propose(
            &mut connection,
            proposer,
            ProposalStepType::Call,
            vec![slot("Jun 3", "10:00 AM"), slot("Jun 4", "2:30 PM")],
            Utc::now(),
        )
        .unwrap();
        let first_id = connection.metadata.time_proposal.as_ref().unwrap().id;

        apply_propose(
            &mut connection,
            proposer,
            ProposalStepType::Visit,
            vec![slot("Jun 9", "1:00 PM")],
            Utc::now(),
        )
        .unwrap();

        let proposal = connection.metadata.time_proposal.as_ref().unwrap();
        assert_ne!(proposal.id, first_id);
        assert_eq!(proposal.slots.len(), 1);
        assert_eq!(proposal.step_type, ProposalStepType::Visit);
        // Exactly one thread entry per propose call.
        assert_eq!(connection.metadata.thread.len(), 2);
    }

    #[test]
    fn accept_confirms_chosen_slot_and_clears_next_step_request() {
        let mut connection = accepted_connection();
        let proposer = connection.from_profile_id;
        let responder = connection.to_profile_id;
        connection.metadata.next_step_request = Some(NextStepRequest {
            step_type: ProposalStepType::Call,
            requested_by: responder,
            requested_at: Utc::now(),
        });
        apply_propose(
            &mut connection,
            proposer,
            ProposalStepType::Call,
            vec![slot("Jun 3", "10:00 AM"), slot("Jun 4", "2:30 PM")],
            Utc::now(),
        )
        .unwrap();

        apply_respond(&mut connection, responder, ProposalResponse::Accept, Some(1), Utc::now())
            .unwrap();

        let proposal = connection.metadata.time_proposal.as_ref().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Accepted);
        assert_eq!(proposal.accepted_slot_index, Some(1));
        assert!(proposal.resolved_at.is_some());

        let call = connection.metadata.scheduled_call.as_ref().unwrap();
        assert_eq!(call.status, ScheduledCallStatus::Confirmed);
        assert_eq!(call.date, "Jun 4");
        assert_eq!(call.proposed_by, proposer);

        assert!(connection.metadata.next_step_request.is_none());
        // Propose appended one entry, accept appended one more.
        assert_eq!(connection.metadata.thread.len(), 2);
        assert_eq!(
            connection.metadata.thread[1].kind,
            ThreadMessageKind::TimeAccepted
        );
    }

    #[test]
    fn accept_requires_slot_index_in_range() {
        let mut connection = accepted_connection();
        let proposer = connection.from_profile_id;
        apply_propose(
            &mut connection,
            proposer,
            ProposalStepType::Call,
            vec![slot("Jun 3", "10:00 AM")],
            Utc::now(),
        )
        .unwrap();

        let responder = connection.to_profile_id;
        let missing =
            apply_respond(&mut connection, responder, ProposalResponse::Accept, None, Utc::now())
                .unwrap_err();
        assert!(matches!(missing, ConnectionError::Validation(_)));

        let out_of_range =
            apply_respond(&mut connection, responder, ProposalResponse::Accept, Some(1), Utc::now())
                .unwrap_err();
        assert!(matches!(out_of_range, ConnectionError::Validation(_)));
    }

    #[test]
    fn decline_drops_proposal_and_keeps_next_step_request() {
        let mut connection = accepted_connection();
        let proposer = connection.from_profile_id;
        let responder = connection.to_profile_id;
        connection.metadata.next_step_request = Some(NextStepRequest {
            step_type: ProposalStepType::Consultation,
            requested_by: responder,
            requested_at: Utc::now(),
        });
        apply_propose(
            &mut connection,
            proposer,
            ProposalStepType::Consultation,
            vec![slot("Jun 3", "10:00 AM")],
            Utc::now(),
        )
        .unwrap();

        apply_respond(&mut connection, responder, ProposalResponse::Decline, None, Utc::now())
            .unwrap();

        assert!(connection.metadata.time_proposal.is_none());
        assert!(connection.metadata.next_step_request.is_some());
        // Declining never touches the connection status.
        assert_eq!(connection.status, ConnectionStatus::Accepted);
        assert_eq!(connection.metadata.thread.len(), 2);
    }

    #[test]
    fn respond_without_live_proposal_is_invalid_state() {
        let mut connection = accepted_connection();
        let responder = connection.to_profile_id;
        let err =
            apply_respond(&mut connection, responder, ProposalResponse::Decline, None, Utc::now())
                .unwrap_err();
        match err {
            ConnectionError::InvalidState(message) => {
                assert_eq!(message, "No active time proposal to respond to");
            }
            other => panic!("expected InvalidState, got {:?}", other),
        }
    }

    #[test]
    fn resolved_proposal_cannot_be_responded_to_again() {
        let mut connection = accepted_connection();
        let proposer = connection.from_profile_id;
        let responder = connection.to_profile_id;
        apply_propose(
            &mut connection,
            proposer,
            ProposalStepType::Call,
            vec![slot("Jun 3", "10:00 AM")],
            Utc::now(),
        )
        .unwrap();
        apply_respond(&mut connection, responder, ProposalResponse::Accept, Some(0), Utc::now())
            .unwrap();

        let err =
            apply_respond(&mut connection, responder, ProposalResponse::Accept, Some(0), Utc::now())
                .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidState(_)));
    }

    #[test]
    fn stale_slots_remain_acceptable() {
        // No wall-clock expiry: a proposal whose slots are in the past can
        // still be accepted.
        let mut connection = accepted_connection();
        let proposer = connection.from_profile_id;
        apply_propose(
            &mut connection,
            proposer,
            ProposalStepType::Call,
            vec![slot("Jan 1, 1990", "9:00 AM")],
            Utc::now(),
        )
        .unwrap();
        let responder = connection.to_profile_id;
        assert!(apply_respond(
            &mut connection,
            responder,
            ProposalResponse::Accept,
            Some(0),
            Utc::now()
        )
        .is_ok());
    }
}
