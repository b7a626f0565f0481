//! Axum router and all HTTP handlers for wms-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers reject malformed input before touching the
//! database, then delegate to one `wms_db` operation each.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};
use uuid::Uuid;
use wms_db::{Committed, PickScan};
use wms_fulfillment::ExceptionReport;
use wms_schemas::{NewOrder, OrderStatus, UserRole, WmsError};

use crate::{
    api_types::{
        AdjustRequest, CancelExceptionRequest, CancelOrderRequest, ClaimRequest,
        CompletePickingRequest, CurrentViewRequest, ErrorResponse, HealthResponse,
        InventoryResponse, LogoutResponse, PackerRequest, PickRequest, ReceiveRequest,
        ResolveRequest, ReviewRequest, ShipRequest, SkipTaskRequest, UnclaimRequest,
        VerifyItemRequest,
    },
    state::{uptime_secs, AppState, BusMsg, OrderStatusEvent},
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/orders", post(create_order))
        .route("/v1/orders/:id", get(get_order))
        .route("/v1/orders/:id/history", get(order_history))
        .route("/v1/orders/:id/claim", post(claim))
        .route("/v1/orders/:id/unclaim", post(unclaim))
        .route("/v1/orders/:id/pick", post(pick))
        .route("/v1/orders/:id/skip-task", post(skip_task))
        .route("/v1/orders/:id/complete", post(complete_picking))
        .route("/v1/orders/:id/cancel", post(cancel_order))
        .route("/v1/orders/:id/pack/claim", post(pack_claim))
        .route("/v1/orders/:id/pack/verify", post(pack_verify))
        .route("/v1/orders/:id/pack/complete", post(pack_complete))
        .route("/v1/orders/:id/ship", post(ship))
        .route("/v1/exceptions/log", post(log_exception))
        .route("/v1/exceptions/:id/review", post(review_exception))
        .route("/v1/exceptions/:id/approve", post(approve_exception))
        .route("/v1/exceptions/:id/reject", post(reject_exception))
        .route("/v1/exceptions/:id/resolve", post(resolve_exception))
        .route("/v1/exceptions/:id/cancel", post(cancel_exception))
        .route("/v1/auth/current-view", post(current_view))
        .route("/v1/auth/logout", post(logout))
        .route("/v1/presence", get(presence))
        .route("/v1/inventory/receive", post(receive))
        .route("/v1/inventory/adjust", post(adjust))
        .route("/v1/inventory/reconcile/:sku", get(reconcile))
        .route("/v1/inventory/:sku", get(inventory))
        .route("/v1/inventory/:sku/transactions", get(inventory_transactions))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// `WmsError` as an HTTP response: Validation 400, NotFound 404, Conflict
/// 409, Inventory 422, Fatal/Storage 500.
#[derive(Debug)]
pub struct ApiError(pub WmsError);

impl From<WmsError> for ApiError {
    fn from(e: WmsError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WmsError::Validation(_) => StatusCode::BAD_REQUEST,
            WmsError::NotFound { .. } => StatusCode::NOT_FOUND,
            WmsError::Conflict(_) => StatusCode::CONFLICT,
            WmsError::Inventory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WmsError::Fatal(_) | WmsError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if self.0.is_internal() {
            error!(kind = self.0.kind(), error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                kind: self.0.kind().to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn require(value: &str, field: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(WmsError::validation(format!("{field} must not be empty")).into());
    }
    Ok(())
}

fn require_positive(value: i64, field: &str) -> ApiResult<()> {
    if value <= 0 {
        return Err(WmsError::validation(format!("{field} must be > 0, got {value}")).into());
    }
    Ok(())
}

/// Broadcast the transitions and hand the committed aggregate back.
fn committed(st: &AppState, c: Committed) -> Json<Committed> {
    st.publish_changes(&c.state_changes);
    Json(c)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            config_hash: st.config_hash.clone(),
            uptime_secs: uptime_secs(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub(crate) async fn create_order(
    State(st): State<Arc<AppState>>,
    Json(body): Json<NewOrder>,
) -> ApiResult<impl IntoResponse> {
    let agg = wms_db::create_order(&st.pool, &body).await?;
    Ok((StatusCode::CREATED, Json(agg)))
}

pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(wms_db::get_order(&st.pool, id).await?))
}

pub(crate) async fn order_history(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(wms_db::list_state_changes(&st.pool, id).await?))
}

pub(crate) async fn claim(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ClaimRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.picker_id, "picker_id")?;
    let c = wms_db::claim_order(&st.pool, id, &body.picker_id, &st.config.allocation).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn unclaim(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UnclaimRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.user_id, "user_id")?;
    require(&body.reason, "reason")?;
    let c = wms_db::unclaim_order(&st.pool, id, &body.user_id, &body.reason).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn pick(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<PickRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.picker_id, "picker_id")?;
    require(&body.sku, "sku")?;
    require(&body.bin_location, "bin_location")?;
    require_positive(body.quantity, "quantity")?;
    let scan = PickScan {
        task_id: body.pick_task_id,
        sku: body.sku,
        bin_location: body.bin_location,
        quantity: body.quantity,
    };
    let c = wms_db::record_pick(&st.pool, id, &body.picker_id, &scan).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn skip_task(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SkipTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.user_id, "user_id")?;
    require(&body.reason, "reason")?;
    let c = wms_db::skip_task(&st.pool, id, body.pick_task_id, &body.user_id, &body.reason)
        .await?;
    Ok(committed(&st, c))
}

pub(crate) async fn complete_picking(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<CompletePickingRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.picker_id, "picker_id")?;
    let c = wms_db::complete_picking(&st.pool, id, &body.picker_id).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn cancel_order(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.user_id, "user_id")?;
    require(&body.reason, "reason")?;
    let c = wms_db::cancel_order(&st.pool, id, &body.user_id, &body.reason).await?;
    info!(order_id = %id, user_id = %body.user_id, "order cancelled");
    Ok(committed(&st, c))
}

pub(crate) async fn pack_claim(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<PackerRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.packer_id, "packer_id")?;
    let c = wms_db::claim_packing(&st.pool, id, &body.packer_id).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn pack_verify(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<VerifyItemRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.packer_id, "packer_id")?;
    require_positive(body.quantity, "quantity")?;
    let c = wms_db::verify_item(&st.pool, id, body.order_item_id, &body.packer_id, body.quantity)
        .await?;
    Ok(committed(&st, c))
}

pub(crate) async fn pack_complete(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<PackerRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.packer_id, "packer_id")?;
    let c = wms_db::complete_packing(&st.pool, id, &body.packer_id).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn ship(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ShipRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.user_id, "user_id")?;
    let c = wms_db::ship_order(&st.pool, id, &body.user_id, body.tracking_number.as_deref())
        .await?;
    Ok(committed(&st, c))
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

pub(crate) async fn log_exception(
    State(st): State<Arc<AppState>>,
    Json(body): Json<ExceptionReport>,
) -> ApiResult<impl IntoResponse> {
    require(&body.reported_by, "reported_by")?;
    if body.actual_quantity < 0 || body.expected_quantity < body.actual_quantity {
        return Err(WmsError::validation(format!(
            "expected {} / actual {} must satisfy expected >= actual >= 0",
            body.expected_quantity, body.actual_quantity
        ))
        .into());
    }
    let ex = wms_db::log_exception(&st.pool, &body, &st.config.short_pick_tolerance).await?;
    st.log_line(
        "WARN",
        format!(
            "exception {} ({}) logged on order {}",
            ex.id, ex.exception_type, ex.order_id
        ),
    );
    Ok((StatusCode::CREATED, Json(ex)))
}

pub(crate) async fn review_exception(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.reviewer, "reviewer")?;
    let c = wms_db::start_review(&st.pool, id, &body.reviewer).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn approve_exception(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.reviewer, "reviewer")?;
    let c = wms_db::approve_exception(&st.pool, id, &body.reviewer).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn reject_exception(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.reviewer, "reviewer")?;
    let c = wms_db::reject_exception(&st.pool, id, &body.reviewer, body.notes.as_deref()).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn resolve_exception(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.resolved_by, "resolved_by")?;
    let c = wms_db::resolve_exception(&st.pool, id, &body.resolution, &body.resolved_by).await?;
    Ok(committed(&st, c))
}

pub(crate) async fn cancel_exception(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelExceptionRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.user_id, "user_id")?;
    let c = wms_db::cancel_exception(&st.pool, id, &body.user_id).await?;
    Ok(committed(&st, c))
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

fn header_user_id(headers: &HeaderMap) -> ApiResult<String> {
    let user = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    require(user, USER_ID_HEADER)?;
    Ok(user.to_string())
}

fn header_role(headers: &HeaderMap) -> ApiResult<UserRole> {
    let raw = headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    require(raw, USER_ROLE_HEADER)?;
    UserRole::parse(&raw.to_ascii_uppercase())
        .map_err(|e| WmsError::validation(e.to_string()).into())
}

/// Fire-and-forget navigation signal. Never touches orders.
pub(crate) async fn current_view(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CurrentViewRequest>,
) -> ApiResult<StatusCode> {
    let user_id = header_user_id(&headers)?;
    let role = header_role(&headers)?;
    st.presence
        .write()
        .await
        .report_view(&user_id, role, &body.view, Utc::now())?;
    Ok(StatusCode::ACCEPTED)
}

/// End a session: drop presence and release every order the user holds.
pub(crate) async fn logout(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user_id = header_user_id(&headers)?;
    st.presence.write().await.forget(&user_id);

    let released = wms_db::unclaim_all_for_picker(&st.pool, &user_id, "logout").await?;
    let now = Utc::now();
    for order_id in &released {
        let _ = st.bus.send(BusMsg::OrderStatus(OrderStatusEvent {
            order_id: *order_id,
            from: OrderStatus::Picking,
            to: OrderStatus::Pending,
            actor: user_id.clone(),
            at: now,
        }));
    }
    info!(user_id = %user_id, released = released.len(), "logout");
    Ok(Json(LogoutResponse {
        user_id,
        released_orders: released,
    }))
}

pub(crate) async fn presence(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = st.presence.read().await.snapshot(Utc::now());
    Json(snapshot)
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

pub(crate) async fn inventory(
    State(st): State<Arc<AppState>>,
    Path(sku): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let units = wms_db::list_units(&st.pool, &sku).await?;
    Ok(Json(InventoryResponse::from_units(&sku, units)))
}

pub(crate) async fn inventory_transactions(
    State(st): State<Arc<AppState>>,
    Path(sku): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(wms_db::list_transactions(&st.pool, &sku).await?))
}

pub(crate) async fn receive(
    State(st): State<Arc<AppState>>,
    Json(body): Json<ReceiveRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.sku, "sku")?;
    require(&body.bin_location, "bin_location")?;
    require(&body.actor, "actor")?;
    require_positive(body.quantity, "quantity")?;
    let tx = wms_db::receive_stock(
        &st.pool,
        &body.sku,
        &body.bin_location,
        body.quantity,
        &body.actor,
        &body.reason,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub(crate) async fn adjust(
    State(st): State<Arc<AppState>>,
    Json(body): Json<AdjustRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&body.sku, "sku")?;
    require(&body.bin_location, "bin_location")?;
    require(&body.actor, "actor")?;
    require(&body.reason, "reason")?;
    if body.delta == 0 {
        return Err(WmsError::validation("delta must be non-zero").into());
    }
    let tx = wms_db::adjust_stock(
        &st.pool,
        &body.sku,
        &body.bin_location,
        body.delta,
        &body.actor,
        &body.reason,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub(crate) async fn reconcile(
    State(st): State<Arc<AppState>>,
    Path(sku): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = wms_db::reconcile_sku(&st.pool, &sku).await?;
    if !report.is_clean() {
        st.log_line("ERROR", format!("inventory drift detected for {sku}"));
    }
    Ok(Json(report))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::OrderStatus(_) => "order_status",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
