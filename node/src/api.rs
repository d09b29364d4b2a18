//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the campaign host over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                     | Description                    |
//! |--------|------------------------------------------|--------------------------------|
//! | GET    | `/health`                                | Liveness probe                 |
//! | GET    | `/status`                                | Host summary                   |
//! | GET    | `/campaigns`                             | All campaigns (`?owner=`, `?backer=`) |
//! | POST   | `/campaigns`                             | Create a campaign              |
//! | GET    | `/campaigns/:id`                         | One campaign                   |
//! | GET    | `/campaigns/:id/contributions/:address`  | A contributor's entry          |
//! | POST   | `/campaigns/:id/contribute`              | Contribute                     |
//! | POST   | `/campaigns/:id/finalize`                | Finalize after the deadline    |
//! | POST   | `/campaigns/:id/withdraw`                | Owner withdrawal               |
//! | POST   | `/campaigns/:id/refund`                  | Contributor refund             |
//! | GET    | `/accounts/:address`                     | Ledger balance                 |
//! | POST   | `/faucet`                                | Devnet mint                    |
//! | GET    | `/events`                                | Notification journal (`?since=`) |
//! | GET    | `/ws`                                    | Live notification stream       |
//!
//! The calling account travels in the request body (`caller`, `from`,
//! `owner`). Rejections come back as `{ "error": ..., "code": ... }` with a
//! 4xx status chosen by the kind of rejection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crowdx_contracts::{CampaignError, CampaignId, CampaignParams, EventRecord};
use crowdx_protocol::config::days_to_secs;
use crowdx_protocol::{Address, Amount};

use crate::host::{CampaignView, Host, HostError, HostResult};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// The host behind the process-wide mutex. Every call runs to completion
/// while holding it.
pub type SharedHost = Arc<Mutex<Host>>;

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Registry, ledger and clock.
    pub host: SharedHost,
    /// Broadcast channel feeding `/ws` subscribers.
    pub event_tx: broadcast::Sender<EventRecord>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Runs `op` against the host. On success, every notification it
    /// journaled is counted and broadcast; on failure, the rejection is
    /// counted.
    fn execute<T>(&self, op: impl FnOnce(&mut Host) -> HostResult<T>) -> Result<T, ApiError> {
        let mut host = self.host.lock();
        let since = host.registry().events().len() as u64;

        match op(&mut host) {
            Ok(value) => {
                for record in host.events_since(since) {
                    self.metrics.observe(record);
                    // No subscribers is fine.
                    let _ = self.event_tx.send(record.clone());
                }
                if let Some(escrowed) = host.registry().total_escrowed() {
                    self.metrics.set_escrow(escrowed);
                }
                Ok(value)
            }
            Err(err) => {
                self.metrics.reject(err.code());
                tracing::debug!(code = err.code(), "operation rejected: {}", err);
                Err(err.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route(
            "/campaigns",
            get(list_campaigns_handler).post(create_campaign_handler),
        )
        .route("/campaigns/:id", get(campaign_handler))
        .route(
            "/campaigns/:id/contributions/:address",
            get(contribution_handler),
        )
        .route("/campaigns/:id/contribute", post(contribute_handler))
        .route("/campaigns/:id/finalize", post(finalize_handler))
        .route("/campaigns/:id/withdraw", post(withdraw_handler))
        .route("/campaigns/:id/refund", post(refund_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/faucet", post(faucet_handler))
        .route("/events", get(events_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable code.
    pub code: String,
}

/// A rejection on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }
}

impl From<HostError> for ApiError {
    fn from(err: HostError) -> Self {
        let status = match &err {
            HostError::Campaign(e) => match e {
                CampaignError::UnknownCampaign(_) => StatusCode::NOT_FOUND,
                CampaignError::NotOwner => StatusCode::FORBIDDEN,
                CampaignError::TransferFailed(_) => StatusCode::PAYMENT_REQUIRED,
                CampaignError::InvalidParameters { .. }
                | CampaignError::ZeroAmount
                | CampaignError::AmountOverflow => StatusCode::BAD_REQUEST,
                CampaignError::CampaignNotActive
                | CampaignError::CampaignNotSuccessful
                | CampaignError::CampaignNotFailed
                | CampaignError::DeadlinePassed { .. }
                | CampaignError::DeadlineNotReached { .. }
                | CampaignError::NothingToRefund
                | CampaignError::AlreadyWithdrawn => StatusCode::CONFLICT,
            },
            HostError::Faucet(_) | HostError::FaucetLimit { .. } => StatusCode::BAD_REQUEST,
            HostError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", err);
        }
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

fn parse_campaign_id(raw: &str) -> Result<CampaignId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::bad_request("invalid_campaign_id", format!("{raw}: {e}")))
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::bad_request("invalid_address", format!("{raw}: {e}")))
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /campaigns`. Exactly one duration field must be set.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCampaignRequest {
    pub owner: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub goal: Amount,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub duration_days: Option<u64>,
}

/// Body of `POST /campaigns/:id/contribute`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContributeRequest {
    pub from: String,
    pub amount: Amount,
}

/// Body of finalize, withdraw and refund calls.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallerRequest {
    pub caller: String,
}

/// Body of `POST /faucet`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub to: String,
    pub amount: Amount,
}

/// Query string of `GET /campaigns`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub owner: Option<String>,
    pub backer: Option<String>,
}

/// Query string of `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}

/// Response of `GET /campaigns/:id/contributions/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContributionResponse {
    pub campaign: CampaignId,
    pub contributor: Address,
    pub amount: Amount,
}

/// Response of withdraw and refund calls.
#[derive(Debug, Serialize, Deserialize)]
pub struct PayoutResponse {
    pub campaign: CampaignId,
    pub recipient: Address,
    pub amount: Amount,
}

/// Response of `GET /accounts/:address` and `POST /faucet`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    pub balance: Amount,
    pub frozen: bool,
}

fn account_response(host: &Host, address: Address) -> AccountResponse {
    let account = host.ledger().account(&address);
    AccountResponse {
        address,
        balance: account.map_or(0, |a| a.balance),
        frozen: account.map_or(false, |a| a.frozen),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut status = state.host.lock().status();
    status.version = state.version.clone();
    Json(status)
}

/// `GET /campaigns`: every campaign in creation order.
async fn list_campaigns_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CampaignView>>, ApiError> {
    let owner = query.owner.as_deref().map(parse_address).transpose()?;
    let backer = query.backer.as_deref().map(parse_address).transpose()?;

    let host = state.host.lock();
    let views = match backer {
        Some(backer) => host
            .registry()
            .campaigns_backed_by(&backer)
            .iter()
            .map(|id| host.view(id))
            .collect::<HostResult<Vec<_>>>()?
            .into_iter()
            .filter(|v| owner.map_or(true, |o| v.owner == o))
            .collect(),
        None => host.list(owner.as_ref()),
    };
    Ok(Json(views))
}

/// `POST /campaigns`
async fn create_campaign_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CampaignView>), ApiError> {
    let owner = parse_address(&req.owner)?;
    let duration_secs = match (req.duration_secs, req.duration_days) {
        (Some(secs), None) => secs,
        (None, Some(days)) => days_to_secs(days).ok_or_else(|| {
            ApiError::bad_request("invalid_parameters", "duration_days is too large")
        })?,
        _ => {
            return Err(ApiError::bad_request(
                "invalid_parameters",
                "exactly one of duration_secs and duration_days is required",
            ))
        }
    };
    let params = CampaignParams {
        title: req.title,
        description: req.description,
        goal: req.goal,
        duration_secs,
    };

    let view = state.execute(|host| {
        let id = host.create_campaign(owner, params)?;
        host.view(&id)
    })?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /campaigns/:id`
async fn campaign_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CampaignView>, ApiError> {
    let id = parse_campaign_id(&id)?;
    let view = state.host.lock().view(&id)?;
    Ok(Json(view))
}

/// `GET /campaigns/:id/contributions/:address`
async fn contribution_handler(
    State(state): State<AppState>,
    Path((id, address)): Path<(String, String)>,
) -> Result<Json<ContributionResponse>, ApiError> {
    let id = parse_campaign_id(&id)?;
    let contributor = parse_address(&address)?;
    let host = state.host.lock();
    let amount = host
        .registry()
        .campaign(&id)
        .map_err(HostError::from)?
        .contribution_of(&contributor);
    Ok(Json(ContributionResponse {
        campaign: id,
        contributor,
        amount,
    }))
}

/// `POST /campaigns/:id/contribute`
async fn contribute_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ContributeRequest>,
) -> Result<Json<CampaignView>, ApiError> {
    let id = parse_campaign_id(&id)?;
    let from = parse_address(&req.from)?;
    let view = state.execute(|host| {
        host.contribute(&id, &from, req.amount)?;
        host.view(&id)
    })?;
    Ok(Json(view))
}

/// `POST /campaigns/:id/finalize`
async fn finalize_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<CampaignView>, ApiError> {
    let id = parse_campaign_id(&id)?;
    let caller = parse_address(&req.caller)?;
    let view = state.execute(|host| {
        host.finalize(&id, &caller)?;
        host.view(&id)
    })?;
    Ok(Json(view))
}

/// `POST /campaigns/:id/withdraw`
async fn withdraw_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<PayoutResponse>, ApiError> {
    let id = parse_campaign_id(&id)?;
    let caller = parse_address(&req.caller)?;
    let amount = state.execute(|host| host.withdraw(&id, &caller))?;
    Ok(Json(PayoutResponse {
        campaign: id,
        recipient: caller,
        amount,
    }))
}

/// `POST /campaigns/:id/refund`
async fn refund_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<PayoutResponse>, ApiError> {
    let id = parse_campaign_id(&id)?;
    let caller = parse_address(&req.caller)?;
    let amount = state.execute(|host| host.refund(&id, &caller))?;
    Ok(Json(PayoutResponse {
        campaign: id,
        recipient: caller,
        amount,
    }))
}

/// `GET /accounts/:address`
async fn account_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = parse_address(&address)?;
    let host = state.host.lock();
    Ok(Json(account_response(&host, address)))
}

/// `POST /faucet`: devnet only.
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let to = parse_address(&req.to)?;
    let account = state.execute(|host| {
        host.faucet(&to, req.amount)?;
        Ok(account_response(host, to))
    })?;
    Ok(Json(account))
}

/// `GET /events`
async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let host = state.host.lock();
    Json(host.events_since(query.since).to_vec())
}

/// `GET /ws`: upgrades to a WebSocket that streams every new
/// [`EventRecord`] as JSON.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(record) => {
                        let payload = match serde_json::to_string(&record) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    // Push-only channel; client messages are ignored.
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use crate::store::CrowdStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app_state() -> AppState {
        let store = CrowdStore::open_temporary().expect("temp store");
        let host = Host::open(store).expect("host");
        let (event_tx, _) = broadcast::channel(16);
        AppState {
            version: "0.1.0-test".into(),
            host: Arc::new(Mutex::new(host)),
            event_tx,
            metrics: Arc::new(NodeMetrics::new().expect("metrics")),
        }
    }

    fn addr(label: &str) -> String {
        Address::from_label(label).to_string()
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    fn error_code(body: &[u8]) -> String {
        serde_json::from_slice::<ErrorResponse>(body).unwrap().code
    }

    /// Funds `x` and `y`, then creates a campaign with the given goal and a
    /// one-minute duration. Returns the campaign id.
    async fn seeded(router: &Router, goal: u64) -> String {
        for who in ["x", "y"] {
            let (status, _) = post_json(
                router,
                "/faucet",
                serde_json::json!({ "to": addr(who), "amount": 1_000 }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = post_json(
            router,
            "/campaigns",
            serde_json::json!({
                "owner": addr("owner"),
                "title": "Makerspace",
                "goal": goal,
                "duration_secs": 60,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let view: CampaignView = serde_json::from_slice(&body).unwrap();
        view.id.to_string()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn successful_campaign_end_to_end() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let id = seeded(&router, 10).await;

        let (status, _) = post_json(
            &router,
            &format!("/campaigns/{id}/contribute"),
            serde_json::json!({ "from": addr("x"), "amount": 4 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = post_json(
            &router,
            &format!("/campaigns/{id}/contribute"),
            serde_json::json!({ "from": addr("y"), "amount": 6 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let view: CampaignView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.total_raised, 10);
        assert_eq!(view.progress_percent, 100);

        state.host.lock().advance_time(61).unwrap();

        let (status, body) = post_json(
            &router,
            &format!("/campaigns/{id}/finalize"),
            serde_json::json!({ "caller": addr("y") }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let view: CampaignView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.state_code, 1);

        let (status, body) = post_json(
            &router,
            &format!("/campaigns/{id}/withdraw"),
            serde_json::json!({ "caller": addr("owner") }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let payout: PayoutResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payout.amount, 10);

        let (status, body) = post_json(
            &router,
            &format!("/campaigns/{id}/withdraw"),
            serde_json::json!({ "caller": addr("owner") }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "already_withdrawn");

        let (_, body) = get(&router, &format!("/accounts/{}", addr("owner"))).await;
        let account: AccountResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(account.balance, 10);

        assert_eq!(state.metrics.withdrawals_total.get(), 1);
        assert_eq!(state.metrics.escrow_balance.get(), 0);
        assert_eq!(state.host.lock().audit(), Ok(()));
    }

    #[tokio::test]
    async fn failed_campaign_refunds_contributor() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let id = seeded(&router, 10).await;

        post_json(
            &router,
            &format!("/campaigns/{id}/contribute"),
            serde_json::json!({ "from": addr("x"), "amount": 3 }),
        )
        .await;
        let (_, body) = get(
            &router,
            &format!("/campaigns/{id}/contributions/{}", addr("x")),
        )
        .await;
        let entry: ContributionResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(entry.amount, 3);

        state.host.lock().advance_time(120).unwrap();
        post_json(
            &router,
            &format!("/campaigns/{id}/finalize"),
            serde_json::json!({ "caller": addr("x") }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            &format!("/campaigns/{id}/refund"),
            serde_json::json!({ "caller": addr("x") }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let payout: PayoutResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payout.amount, 3);

        let (status, body) = post_json(
            &router,
            &format!("/campaigns/{id}/refund"),
            serde_json::json!({ "caller": addr("x") }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "nothing_to_refund");
    }

    #[tokio::test]
    async fn rejections_map_to_status_codes() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let id = seeded(&router, 10).await;

        // Finalize before the deadline.
        let (status, body) = post_json(
            &router,
            &format!("/campaigns/{id}/finalize"),
            serde_json::json!({ "caller": addr("owner") }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "deadline_not_reached");

        // Contribution the contributor cannot cover.
        let (status, body) = post_json(
            &router,
            &format!("/campaigns/{id}/contribute"),
            serde_json::json!({ "from": addr("broke"), "amount": 5 }),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(error_code(&body), "transfer_failed");

        // Zero contribution.
        let (status, _) = post_json(
            &router,
            &format!("/campaigns/{id}/contribute"),
            serde_json::json!({ "from": addr("x"), "amount": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Stranger withdrawing from a successful campaign.
        post_json(
            &router,
            &format!("/campaigns/{id}/contribute"),
            serde_json::json!({ "from": addr("x"), "amount": 10 }),
        )
        .await;
        state.host.lock().advance_time(60).unwrap();
        post_json(
            &router,
            &format!("/campaigns/{id}/finalize"),
            serde_json::json!({ "caller": addr("x") }),
        )
        .await;
        let (status, body) = post_json(
            &router,
            &format!("/campaigns/{id}/withdraw"),
            serde_json::json!({ "caller": addr("x") }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&body), "not_owner");

        // Unknown and malformed handles.
        let ghost = CampaignId::generate();
        let (status, body) = get(&router, &format!("/campaigns/{ghost}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&body), "unknown_campaign");
        let (status, body) = get(&router, "/campaigns/nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "invalid_campaign_id");

        assert_eq!(
            state
                .metrics
                .rejected_operations_total
                .with_label_values(&["not_owner"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn create_validates_input() {
        let router = create_router(test_app_state());

        let (status, body) = post_json(
            &router,
            "/campaigns",
            serde_json::json!({ "owner": addr("o"), "title": "t", "goal": 0, "duration_days": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "invalid_parameters");

        let (status, _) = post_json(
            &router,
            "/campaigns",
            serde_json::json!({ "owner": addr("o"), "title": "t", "goal": 5 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_json(
            &router,
            "/campaigns",
            serde_json::json!({ "owner": "alice", "title": "t", "goal": 5, "duration_secs": 9 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "invalid_address");
    }

    #[tokio::test]
    async fn list_filters_and_events() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let mut rx = state.event_tx.subscribe();
        let id = seeded(&router, 10).await;
        post_json(
            &router,
            "/campaigns",
            serde_json::json!({
                "owner": addr("other"), "title": "Second", "goal": 1, "duration_secs": 60,
            }),
        )
        .await;
        post_json(
            &router,
            &format!("/campaigns/{id}/contribute"),
            serde_json::json!({ "from": addr("x"), "amount": 2 }),
        )
        .await;

        let (_, body) = get(&router, "/campaigns").await;
        let all: Vec<CampaignView> = serde_json::from_slice(&body).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id.to_string(), id);

        let (_, body) = get(&router, &format!("/campaigns?owner={}", addr("owner"))).await;
        let mine: Vec<CampaignView> = serde_json::from_slice(&body).unwrap();
        assert_eq!(mine.len(), 1);

        let (_, body) = get(&router, &format!("/campaigns?backer={}", addr("x"))).await;
        let backed: Vec<CampaignView> = serde_json::from_slice(&body).unwrap();
        assert_eq!(backed.len(), 1);
        assert_eq!(backed[0].id.to_string(), id);

        let (_, body) = get(&router, "/events?since=1").await;
        let events: Vec<EventRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.event.kind(), "campaign_created");

        let (_, body) = get(&router, "/status").await;
        let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status["campaigns"], 2);
        assert_eq!(status["custody"], 2);
        assert_eq!(status["version"], "0.1.0-test");
    }
}
