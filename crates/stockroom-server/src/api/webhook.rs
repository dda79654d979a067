use axum::{extract::State, Extension, Json};
use serde_json::Value;
use stockroom_catalog::{apply_webhook_events, WebhookSummary};
use stockroom_pos::parse_webhook;

use crate::middleware::RequestId;

use super::{map_catalog_error, ApiError, ApiResponse, AppState};

/// POST /api/v1/webhooks/inventory
///
/// Unknown items and unsupported event types are acknowledged with a 200 so
/// the POS does not keep redelivering them.
pub(super) async fn receive_inventory(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<Value>,
) -> Result<Json<ApiResponse<WebhookSummary>>, ApiError> {
    let events = parse_webhook(&body);
    let summary = apply_webhook_events(state.catalog.as_ref(), &events)
        .await
        .map_err(|e| map_catalog_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, summary))
}
