use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::campaign::{PacingConfig, Sequencer, TraceReporter};
use crate::contacts::parse_contacts;
use crate::errors::{GatewayError, StoreError};
use crate::events::CallEvents;
use crate::gateway::{CallGateway, CallRequest, TENANT_HEADER};
use crate::store::{CampaignStatus, DbHandle, FailurePolicy, PromptSelection};
use crate::tenant::TenantSession;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub gateway: Arc<dyn CallGateway>,
    pub events: Arc<CallEvents>,
    /// Campaign ids with a live sequencer task in this process.
    pub running: Mutex<HashSet<i64>>,
    pub pacing: PacingConfig,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

/// Legacy clients send snake_case and `documentId` variants; all are accepted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallRequest {
    #[serde(alias = "phone_number")]
    pub phone_number: Option<String>,
    #[serde(alias = "name")]
    pub prospect_name: Option<String>,
    #[serde(alias = "documentId", alias = "prompt_id")]
    pub prompt_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CallEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub phone_number: Option<String>,
    pub data: Option<Value>,
}

#[derive(Deserialize)]
pub struct CreatePromptRequest {
    pub title: String,
    pub prompt: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Deserialize)]
pub struct UpdatePromptRequest {
    pub title: String,
    pub prompt: String,
    /// When supplied, the update is rejected if the stored version differs.
    pub version: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateCampaignRequest {
    pub name: Option<String>,
    /// Raw delimited contact-list text, header row included.
    pub csv: String,
    /// Either a stored prompt id...
    pub prompt_id: Option<String>,
    /// ...or a full selection carrying a live (possibly unsaved) draft body.
    pub prompt: Option<PromptSelection>,
    pub failure_policy: Option<FailurePolicy>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    SubscriptionBlocked(&'static str),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::SubscriptionBlocked(reason) => {
                (StatusCode::PAYMENT_REQUIRED, reason.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    ApiError::Internal(e.to_string())
}

/// Map store-level decisions to HTTP codes; everything else is a 500.
fn store_error(e: anyhow::Error) -> ApiError {
    match e.downcast_ref::<StoreError>() {
        Some(StoreError::PromptNotFound { .. }) | Some(StoreError::CampaignNotFound { .. }) => {
            ApiError::NotFound(e.to_string())
        }
        Some(StoreError::PromptVersionConflict { .. }) => ApiError::Conflict(e.to_string()),
        None => ApiError::Internal(e.to_string()),
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/start-call", post(start_call))
        .route("/api/call-events", post(call_events))
        .route("/api/prompts", get(list_prompts).post(create_prompt))
        .route("/api/prompts/default", get(default_prompt))
        .route(
            "/api/prompts/{id}",
            get(get_prompt).put(update_prompt).delete(delete_prompt),
        )
        .route("/api/campaigns", get(list_campaigns).post(create_campaign))
        .route("/api/campaigns/{id}", get(get_campaign))
        .route("/api/campaigns/{id}/run", post(run_campaign))
        .route("/api/campaigns/{id}/cancel", post(cancel_campaign))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Every tenant-scoped route requires the tenant id header.
fn require_tenant(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("User not authenticated".to_string()))
}

async fn load_session(state: &SharedState, tenant_id: &str) -> Result<TenantSession, ApiError> {
    let tenant_id = tenant_id.to_string();
    state
        .db
        .call(move |db| TenantSession::load(db, &tenant_id))
        .await
        .map_err(internal)
}

/// Plan-restricted operations consult the subscription gate.
async fn require_subscription(state: &SharedState, tenant_id: &str) -> Result<(), ApiError> {
    let session = load_session(state, tenant_id).await?;
    let decision = session.gate();
    if decision.is_allowed() {
        Ok(())
    } else {
        Err(ApiError::SubscriptionBlocked(decision.reason()))
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

/// Proxy a single call initiation to the external bridge.
///
/// Error bodies keep the bridge's `{success, message}` shape rather than the
/// API's `{error}` shape, because existing clients parse them that way.
async fn start_call(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<StartCallRequest>,
) -> Response {
    let tenant_id = match require_tenant(&headers) {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    let phone_number = match req.phone_number.map(|p| p.trim().to_string()) {
        Some(p) if !p.is_empty() => p,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "message": "phoneNumber is required"})),
            )
                .into_response();
        }
    };
    let prompt_id = match req.prompt_id.map(|p| p.trim().to_string()) {
        Some(p) if !p.is_empty() => p,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "message": "promptId is required"})),
            )
                .into_response();
        }
    };

    let request = CallRequest {
        tenant_id,
        phone_number,
        prospect_name: req.prospect_name.unwrap_or_default(),
        prompt_id,
    };

    match state.gateway.start_call(&request).await {
        Ok(acceptance) => {
            let status =
                StatusCode::from_u16(acceptance.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(acceptance.body)).into_response()
        }
        Err(GatewayError::UpstreamBody { status, snippet }) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "success": false,
                "message": format!("External service error: HTTP {} - {}", status, snippet),
            })),
        )
            .into_response(),
        Err(e @ GatewayError::Transport(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": e.to_string()})),
        )
            .into_response(),
    }
}

/// Inbound webhook from the calling bridge: a `call_ended` event wakes any
/// sequencer waiting on that phone number.
async fn call_events(
    State(state): State<SharedState>,
    Json(event): Json<CallEventRequest>,
) -> impl IntoResponse {
    let phone = event.phone_number.or_else(|| {
        event
            .data
            .as_ref()
            .and_then(|d| d.get("phone_number"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let woken = match (event.event_type.as_str(), phone) {
        ("call_ended", Some(phone)) => state.events.resolve(&phone),
        _ => 0,
    };
    Json(json!({
        "received": true,
        "woken": woken,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn list_prompts(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let prompts = state
        .db
        .call(move |db| db.list_prompts(&tenant_id))
        .await
        .map_err(internal)?;
    Ok(Json(prompts))
}

async fn create_prompt(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreatePromptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    require_subscription(&state, &tenant_id).await?;

    if req.title.trim().is_empty() || req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Title and prompt are required".to_string(),
        ));
    }

    let prompt = state
        .db
        .call(move |db| {
            db.create_prompt(
                &tenant_id,
                req.title.trim(),
                &req.prompt,
                req.description.as_deref(),
                req.is_default,
            )
        })
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(prompt)))
}

async fn default_prompt(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let prompt = state
        .db
        .call(move |db| db.get_default_prompt(&tenant_id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound("No default prompt configured".to_string()))?;
    Ok(Json(prompt))
}

async fn get_prompt(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let lookup_id = id.clone();
    let prompt = state
        .db
        .call(move |db| db.get_prompt(&tenant_id, &lookup_id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Prompt {} not found", id)))?;
    Ok(Json(prompt))
}

async fn update_prompt(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdatePromptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    require_subscription(&state, &tenant_id).await?;

    if req.title.trim().is_empty() || req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Title and prompt are required".to_string(),
        ));
    }

    let prompt = state
        .db
        .call(move |db| db.update_prompt(&tenant_id, &id, req.title.trim(), &req.prompt, req.version))
        .await
        .map_err(store_error)?;
    Ok(Json(prompt))
}

async fn delete_prompt(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    require_subscription(&state, &tenant_id).await?;

    let deleted = state
        .db
        .call(move |db| db.delete_prompt(&tenant_id, &id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::NotFound("Prompt not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_campaigns(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let campaigns = state
        .db
        .call(move |db| db.list_campaigns(&tenant_id))
        .await
        .map_err(internal)?;
    Ok(Json(campaigns))
}

async fn create_campaign(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    require_subscription(&state, &tenant_id).await?;

    let parsed = parse_contacts(&req.csv).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // A full selection carries a live draft body; a bare id loads the
    // persisted record.
    let selection = match (req.prompt, req.prompt_id) {
        (Some(selection), _) if !selection.id.trim().is_empty() => selection,
        (_, Some(prompt_id)) => {
            let tenant = tenant_id.clone();
            let lookup_id = prompt_id.clone();
            let prompt = state
                .db
                .call(move |db| db.get_prompt(&tenant, &lookup_id))
                .await
                .map_err(internal)?
                .ok_or_else(|| ApiError::NotFound(format!("Prompt {} not found", prompt_id)))?;
            PromptSelection::from_prompt(&prompt)
        }
        _ => {
            return Err(ApiError::BadRequest(
                "A prompt selection is required".to_string(),
            ));
        }
    };

    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Untitled campaign".to_string());
    let policy = req.failure_policy.unwrap_or_default();

    let loaded = parsed.loaded();
    let skipped = parsed.skipped;
    let campaign = state
        .db
        .call(move |db| db.create_campaign(&tenant_id, &name, &selection, policy, &parsed.contacts))
        .await
        .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({"campaign": campaign, "loaded": loaded, "skipped": skipped})),
    ))
}

async fn get_campaign(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let campaign = state
        .db
        .call(move |db| db.get_campaign(id))
        .await
        .map_err(internal)?
        .filter(|c| c.tenant_id == tenant_id)
        .ok_or_else(|| ApiError::NotFound(format!("Campaign {} not found", id)))?;
    let contacts = state
        .db
        .call(move |db| db.campaign_contacts(id))
        .await
        .map_err(internal)?;
    Ok(Json(json!({"campaign": campaign, "contacts": contacts})))
}

/// Start (or resume) a campaign's sequencer as a background task.
async fn run_campaign(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    require_subscription(&state, &tenant_id).await?;

    let campaign = state
        .db
        .call(move |db| db.get_campaign(id))
        .await
        .map_err(internal)?
        .filter(|c| c.tenant_id == tenant_id)
        .ok_or_else(|| ApiError::NotFound(format!("Campaign {} not found", id)))?;

    let resume = match campaign.status {
        CampaignStatus::Pending => false,
        // `running` without a live task in this process is a crashed run.
        CampaignStatus::Running | CampaignStatus::Failed => true,
        status => {
            return Err(ApiError::Conflict(format!(
                "Campaign {} already finished ({})",
                id, status
            )));
        }
    };

    {
        let mut running = state
            .running
            .lock()
            .map_err(|_| ApiError::Internal("Run registry lock poisoned".to_string()))?;
        if !running.insert(id) {
            return Err(ApiError::Conflict(format!(
                "Campaign {} is already running",
                id
            )));
        }
    }

    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let sequencer = Sequencer::new(
            task_state.db.clone(),
            Arc::clone(&task_state.gateway),
            task_state.pacing,
        )
        .with_events(Arc::clone(&task_state.events))
        .with_reporter(Arc::new(TraceReporter));

        let result = if resume {
            sequencer.resume(id).await
        } else {
            sequencer.run(id).await
        };
        if let Err(e) = result {
            tracing::error!(campaign = id, "sequencer failed: {}", e);
        }
        if let Ok(mut running) = task_state.running.lock() {
            running.remove(&id);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"campaign_id": id, "status": "started", "resume": resume})),
    ))
}

async fn cancel_campaign(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let campaign = state
        .db
        .call(move |db| db.get_campaign(id))
        .await
        .map_err(internal)?
        .filter(|c| c.tenant_id == tenant_id)
        .ok_or_else(|| ApiError::NotFound(format!("Campaign {} not found", id)))?;

    let campaign = state
        .db
        .call(move |db| db.cancel_campaign(campaign.id))
        .await
        .map_err(store_error)?;
    Ok(Json(campaign))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use crate::gateway::CallAcceptance;
    use crate::store::{Database, SubscriptionStatus};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Gateway double that accepts every call.
    struct AcceptingGateway;

    #[async_trait]
    impl CallGateway for AcceptingGateway {
        async fn start_call(&self, request: &CallRequest) -> Result<CallAcceptance, GatewayError> {
            Ok(CallAcceptance {
                success: true,
                status: 200,
                message: None,
                body: json!({
                    "success": true,
                    "call_id": format!("c-{}", request.phone_number),
                }),
            })
        }
    }

    /// Gateway double that relays an upstream rejection.
    struct RejectingGateway;

    #[async_trait]
    impl CallGateway for RejectingGateway {
        async fn start_call(&self, _request: &CallRequest) -> Result<CallAcceptance, GatewayError> {
            Ok(CallAcceptance {
                success: false,
                status: 429,
                message: Some("Concurrency limit reached".to_string()),
                body: json!({"success": false, "message": "Concurrency limit reached"}),
            })
        }
    }

    fn test_state(gateway: Arc<dyn CallGateway>) -> SharedState {
        let db = DbHandle::new(Database::open_in_memory().unwrap());
        db.lock_sync()
            .unwrap()
            .upsert_tenant("t1", SubscriptionStatus::Active, Some("pro"))
            .unwrap();
        Arc::new(AppState {
            db,
            gateway,
            events: Arc::new(CallEvents::new()),
            running: Mutex::new(HashSet::new()),
            pacing: PacingConfig {
                call_spacing: Duration::from_millis(1),
                completion_timeout: Duration::from_millis(1),
            },
        })
    }

    fn app(state: SharedState) -> Router {
        api_router().with_state(state)
    }

    fn json_request(method: &str, uri: &str, tenant: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(tenant) = tenant {
            builder = builder.header(TENANT_HEADER, tenant);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_is_open() {
        let response = app(test_state(Arc::new(AcceptingGateway)))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_tenant_header_is_unauthorized() {
        let state = test_state(Arc::new(AcceptingGateway));

        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/start-call",
                None,
                json!({"phoneNumber": "+15550001111", "promptId": "p1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(state)
            .oneshot(
                Request::get("/api/prompts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn start_call_requires_phone_and_prompt() {
        let state = test_state(Arc::new(AcceptingGateway));

        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/start-call",
                Some("t1"),
                json!({"promptId": "p1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("phoneNumber is required"));

        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/api/start-call",
                Some("t1"),
                json!({"phoneNumber": "+15550001111"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], json!("promptId is required"));
    }

    #[tokio::test]
    async fn start_call_accepts_legacy_field_names() {
        let state = test_state(Arc::new(AcceptingGateway));
        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/api/start-call",
                Some("t1"),
                json!({
                    "phone_number": "+15550001111",
                    "name": "Jane Doe",
                    "documentId": "p1",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
    }

    #[tokio::test]
    async fn start_call_relays_upstream_rejection_status() {
        let state = test_state(Arc::new(RejectingGateway));
        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/api/start-call",
                Some("t1"),
                json!({"phoneNumber": "+15550001111", "promptId": "p1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Concurrency limit reached"));
    }

    #[tokio::test]
    async fn prompt_crud_round_trip_over_http() {
        let state = test_state(Arc::new(AcceptingGateway));

        // Create.
        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/prompts",
                Some("t1"),
                json!({"title": "Cold open", "prompt": "Hi, this is Sam."}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["id"].as_str().unwrap().to_string();

        // List.
        let response = app(state.clone())
            .oneshot(
                Request::get("/api/prompts")
                    .header(TENANT_HEADER, "t1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        // Update.
        let response = app(state.clone())
            .oneshot(json_request(
                "PUT",
                &format!("/api/prompts/{}", id),
                Some("t1"),
                json!({"title": "Warm open", "prompt": "Hello!"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["title"], json!("Warm open"));
        assert_eq!(updated["version"], json!(2));

        // Delete.
        let response = app(state.clone())
            .oneshot(
                Request::delete(format!("/api/prompts/{}", id))
                    .header(TENANT_HEADER, "t1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn prompt_creation_requires_title_and_body() {
        let state = test_state(Arc::new(AcceptingGateway));
        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/api/prompts",
                Some("t1"),
                json!({"title": "  ", "prompt": "body"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stale_prompt_update_conflicts() {
        let state = test_state(Arc::new(AcceptingGateway));
        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/prompts",
                Some("t1"),
                json!({"title": "A", "prompt": "one"}),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        // First editor saves.
        app(state.clone())
            .oneshot(json_request(
                "PUT",
                &format!("/api/prompts/{}", id),
                Some("t1"),
                json!({"title": "B", "prompt": "two", "version": 1}),
            ))
            .await
            .unwrap();

        // Second editor still holds version 1.
        let response = app(state)
            .oneshot(json_request(
                "PUT",
                &format!("/api/prompts/{}", id),
                Some("t1"),
                json!({"title": "C", "prompt": "three", "version": 1}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unsubscribed_tenant_is_blocked_from_campaigns() {
        let state = test_state(Arc::new(AcceptingGateway));
        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/api/campaigns",
                Some("nobody"),
                json!({"csv": "Name,Phone\nJane,+15550001111\n", "prompt": {"id": "p1", "title": "T", "prompt": "B"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn campaign_create_reports_parse_stats() {
        let state = test_state(Arc::new(AcceptingGateway));
        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/api/campaigns",
                Some("t1"),
                json!({
                    "name": "June leads",
                    "csv": "Full Name,Phone Number\nJane Doe,+15550001111\nNo Phone,\n",
                    "prompt": {"id": "p1", "title": "T", "prompt": "B"},
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["loaded"], json!(1));
        assert_eq!(body["skipped"], json!(1));
        assert_eq!(body["campaign"]["status"], json!("pending"));
    }

    #[tokio::test]
    async fn campaign_create_rejects_unusable_csv() {
        let state = test_state(Arc::new(AcceptingGateway));
        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/api/campaigns",
                Some("t1"),
                json!({
                    "csv": "Name,Phone\nJane,\n",
                    "prompt": {"id": "p1", "title": "T", "prompt": "B"},
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("No valid leads"));
    }

    #[tokio::test]
    async fn run_endpoint_drives_a_campaign_to_completion() {
        let state = test_state(Arc::new(AcceptingGateway));
        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/campaigns",
                Some("t1"),
                json!({
                    "csv": "Name,Phone\nJane Doe,+15550001111\n",
                    "prompt": {"id": "p1", "title": "T", "prompt": "B"},
                }),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["campaign"]["id"].as_i64().unwrap();

        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                &format!("/api/campaigns/{}/run", id),
                Some("t1"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        // Single contact, millisecond pacing: the spawned task finishes fast.
        let mut status = CampaignStatus::Pending;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let campaign = state
                .db
                .call(move |db| db.get_campaign(id))
                .await
                .unwrap()
                .unwrap();
            status = campaign.status;
            if status.is_terminal() {
                break;
            }
        }
        assert_eq!(status, CampaignStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_endpoint_flips_campaign_state() {
        let state = test_state(Arc::new(AcceptingGateway));
        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/campaigns",
                Some("t1"),
                json!({
                    "csv": "Name,Phone\nJane Doe,+15550001111\n",
                    "prompt": {"id": "p1", "title": "T", "prompt": "B"},
                }),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["campaign"]["id"].as_i64().unwrap();

        let response = app(state)
            .oneshot(json_request(
                "POST",
                &format!("/api/campaigns/{}/cancel", id),
                Some("t1"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], json!("canceled"));
    }

    #[tokio::test]
    async fn campaigns_are_invisible_across_tenants() {
        let state = test_state(Arc::new(AcceptingGateway));
        state
            .db
            .lock_sync()
            .unwrap()
            .upsert_tenant("t2", SubscriptionStatus::Active, None)
            .unwrap();

        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/campaigns",
                Some("t1"),
                json!({
                    "csv": "Name,Phone\nJane Doe,+15550001111\n",
                    "prompt": {"id": "p1", "title": "T", "prompt": "B"},
                }),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["campaign"]["id"].as_i64().unwrap();

        let response = app(state)
            .oneshot(
                Request::get(format!("/api/campaigns/{}", id))
                    .header(TENANT_HEADER, "t2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn call_ended_event_wakes_waiters() {
        let state = test_state(Arc::new(AcceptingGateway));
        let events = Arc::clone(&state.events);
        let waiter = tokio::spawn(async move {
            events
                .wait_for("+15550001111", Duration::from_secs(5))
                .await
        });
        tokio::task::yield_now().await;

        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/api/call-events",
                None,
                json!({"type": "call_ended", "phone_number": "+15550001111"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn unrelated_events_are_acknowledged_but_ignored() {
        let state = test_state(Arc::new(AcceptingGateway));
        let response = app(state)
            .oneshot(json_request(
                "POST",
                "/api/call-events",
                None,
                json!({"type": "heartbeat"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["woken"], json!(0));
    }
}
