use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::connections::negotiation::ProposalResponse;
use crate::connections::overlay::{self, OverlayAction};
use crate::connections::service::{ConnectionService, CreateConnectionInput, IntentPatch};
use crate::connections::status::StatusAction;
use crate::connections::model::{ProposalStepType, ProposedSlot};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

/// POST /api/connections - open an inquiry or seed provider interest
///
/// Idempotent: a duplicate pending connection of the same type between
/// the same pair returns the existing id.
pub async fn create(
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<CreateConnectionInput>,
) -> ApiResult<Value> {
    let service = ConnectionService::new().await?;
    let connection = service
        .create_connection(auth_user.profile_id, payload)
        .await?;

    Ok(ApiResponse::created(json!({ "id": connection.id })))
}

/// GET /api/connections/:id - fetch a connection as one of its participants
pub async fn get(
    Path(id): Path<Uuid>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Value> {
    let service = ConnectionService::new().await?;
    let connection = service.get_connection(id, auth_user.profile_id).await?;

    let logical_status = overlay::logical_status(&connection);
    Ok(ApiResponse::success(json!({
        "connection": connection,
        "logical_status": logical_status,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub action: StatusAction,
}

/// POST /api/connections/:id/status - accept, decline, reconsider, or view
pub async fn set_status(
    Path(id): Path<Uuid>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<StatusBody>,
) -> ApiResult<Value> {
    let service = ConnectionService::new().await?;
    let connection = service
        .set_status(id, auth_user.profile_id, payload.action)
        .await?;

    Ok(ApiResponse::success(json!({ "connection": connection })))
}

#[derive(Debug, Deserialize)]
pub struct OverlayBody {
    pub action: OverlayAction,
    pub report_reason: Option<String>,
    pub report_details: Option<String>,
}

/// POST /api/connections/:id/flags - archive/unarchive/hide/report
///
/// Metadata-only: the status column is never written here. The response
/// carries the logical status consumers must display.
pub async fn set_overlay_flag(
    Path(id): Path<Uuid>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<OverlayBody>,
) -> ApiResult<Value> {
    let service = ConnectionService::new().await?;
    let logical_status = service
        .set_overlay_flag(
            id,
            auth_user.profile_id,
            payload.action,
            payload.report_reason,
            payload.report_details,
        )
        .await?;

    Ok(ApiResponse::success(json!({ "logical_status": logical_status })))
}

#[derive(Debug, Deserialize)]
pub struct ProposeBody {
    pub step_type: ProposalStepType,
    pub slots: Vec<ProposedSlot>,
}

/// POST /api/connections/:id/proposals - offer up to three meeting slots
pub async fn propose_times(
    Path(id): Path<Uuid>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<ProposeBody>,
) -> ApiResult<Value> {
    let service = ConnectionService::new().await?;
    let connection = service
        .propose_times(id, auth_user.profile_id, payload.step_type, payload.slots)
        .await?;

    Ok(ApiResponse::success(json!({
        "thread": connection.metadata.thread,
        "time_proposal": connection.metadata.time_proposal,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub action: ProposalResponse,
    pub accepted_slot_index: Option<usize>,
}

/// POST /api/connections/:id/proposals/respond - accept or decline the
/// live proposal
pub async fn respond_to_proposal(
    Path(id): Path<Uuid>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<RespondBody>,
) -> ApiResult<Value> {
    let service = ConnectionService::new().await?;
    let connection = service
        .respond_to_proposal(
            id,
            auth_user.profile_id,
            payload.action,
            payload.accepted_slot_index,
        )
        .await?;

    Ok(ApiResponse::success(json!({
        "thread": connection.metadata.thread,
        "time_proposal": connection.metadata.time_proposal,
        "scheduled_call": connection.metadata.scheduled_call,
    })))
}

/// PATCH /api/connections/:id/intent - edit structured intake fields
pub async fn update_intent(
    Path(id): Path<Uuid>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<IntentPatch>,
) -> ApiResult<Value> {
    let service = ConnectionService::new().await?;
    let connection = service
        .update_intent(id, auth_user.profile_id, payload)
        .await?;

    Ok(ApiResponse::success(json!({
        "message": connection.message,
        "metadata": connection.metadata,
    })))
}
