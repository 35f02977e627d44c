//! Session-bound JSON API over the workflow services.
//!
//! Every handler resolves the caller from `Authorization: Bearer <token>` and
//! hands it to the workflow as an optional principal; the workflows decide
//! whether an anonymous caller is acceptable.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::JsonRejection, FromRequest, FromRequestParts, OptionalFromRequest, Path, Query,
        State,
    },
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;
use vmgate_core::audit::AuditEvent;
use vmgate_core::auth::parse_bearer;
use vmgate_core::domain::asset::{AssetId, AssetQuery, AssetView, NewAsset};
use vmgate_core::domain::approval::{
    Approval, ApprovalDecision, ApprovalEntityType, ApprovalId,
};
use vmgate_core::domain::customization::{CustomizationId, CustomizationRequest};
use vmgate_core::domain::license::{License, LicenseId, LicenseQuery, NewLicense};
use vmgate_core::domain::manpower::{
    Designation, ManpowerSubmission, NewSubmission, SubmissionId, SubmissionQuery,
};
use vmgate_core::domain::physical_server::{NewPhysicalServer, PhysicalServer, PhysicalServerId};
use vmgate_core::domain::request::{Request, RequestDetail, RequestId};
use vmgate_core::domain::page::Page;
use vmgate_core::domain::user::Principal;
use vmgate_core::domain::vm::{VmDetail, VmId, VmInstance, VmQuery, VmSummary};
use vmgate_core::errors::{InterfaceError, WorkflowError};
use vmgate_core::intake::{NewCustomization, NewRequest, VmPlacement};
use vmgate_db::repositories::{SqlUserRepository, UserRepository};
use vmgate_db::{DbPool, Workflows};

#[derive(Clone)]
pub struct ApiState {
    workflows: Workflows,
    users: Arc<dyn UserRepository>,
}

pub fn router(workflows: Workflows, db_pool: DbPool) -> Router {
    let state = ApiState { workflows, users: Arc::new(SqlUserRepository::new(db_pool)) };

    Router::new()
        .route("/api/v1/requests", get(list_my_requests).post(create_request))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/approvals", get(request_approvals))
        .route("/api/v1/requests/{id}/copy", get(copy_request))
        .route("/api/v1/requests/{id}/submit", post(submit_request))
        .route("/api/v1/requests/{id}/provision", post(provision_request))
        .route("/api/v1/approvals/pending", get(pending_approvals))
        .route("/api/v1/approvals/{id}/decision", post(decide_approval))
        .route("/api/v1/customizations", post(create_customization))
        .route("/api/v1/customizations/{id}/approvals", get(customization_approvals))
        .route("/api/v1/customizations/{id}/apply", post(apply_customization))
        .route("/api/v1/vms", get(list_vms))
        .route("/api/v1/vms/{id}", get(vm_detail))
        .route("/api/v1/vms/{id}/audit", get(vm_audit))
        .route("/api/v1/vms/{id}/decommission", post(decommission_vm))
        .route("/api/v1/assets", get(list_assets).post(create_asset))
        .route("/api/v1/assets/{id}", get(get_asset).put(update_asset).delete(delete_asset))
        .route("/api/v1/licenses", get(list_licenses).post(create_license))
        .route(
            "/api/v1/licenses/{id}",
            get(get_license).put(update_license).delete(delete_license),
        )
        .route("/api/v1/servers", get(list_servers).post(create_server))
        .route("/api/v1/servers/{id}", get(get_server).put(update_server).delete(delete_server))
        .route("/api/v1/designations", get(list_designations))
        .route("/api/v1/manpower/submissions", get(list_submissions).post(create_submission))
        .route("/api/v1/manpower/submissions/{id}", put(update_submission))
        .with_state(state)
}

/// Workflow failure rendered as `{"error", "kind", "hint", "correlation_id"}`.
#[derive(Debug)]
pub struct ApiError(WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(error: WorkflowError) -> Self {
        Self(error)
    }
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let correlation_id = format!("err-{}", Uuid::new_v4().simple());
        let interface = self.0.into_interface(correlation_id.clone());
        let status = status_for(&interface);
        if status == StatusCode::SERVICE_UNAVAILABLE {
            warn!(
                event_name = "api.persistence_failure",
                correlation_id = %correlation_id,
                error = %interface.message(),
                "request failed"
            );
        }

        let body = serde_json::json!({
            "error": interface.message(),
            "kind": kind,
            "hint": interface.user_message(),
            "correlation_id": correlation_id,
        });
        (status, Json(body)).into_response()
    }
}

/// The resolved caller, if the request carried a live session token.
pub struct Caller(Option<Principal>);

impl Caller {
    fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

impl FromRequestParts<ApiState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_bearer)
        else {
            return Ok(Self(None));
        };

        let principal = state
            .users
            .resolve_session(&token.hash(), Utc::now())
            .await
            .map_err(WorkflowError::from)?;
        Ok(Self(principal))
    }
}

/// JSON body whose syntax and shape errors render as a validation
/// `ApiError` instead of axum's plain-text rejection.
pub struct JsonBody<T>(pub T);

fn malformed_body(rejection: JsonRejection) -> ApiError {
    ApiError(WorkflowError::Validation(rejection.body_text()))
}

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state).await.map_err(malformed_body)?;
        Ok(Self(value))
    }
}

impl<T, S> OptionalFromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let body = <Json<T> as OptionalFromRequest<S>>::from_request(req, state)
            .await
            .map_err(malformed_body)?;
        Ok(body.map(|Json(value)| Self(value)))
    }
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub decision: String,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    pub placements: Vec<VmPlacement>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecommissionBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

async fn create_request(
    State(state): State<ApiState>,
    caller: Caller,
    JsonBody(input): JsonBody<NewRequest>,
) -> Result<(StatusCode, Json<Request>), ApiError> {
    let request = state.workflows.requests.create(caller.principal(), input).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_my_requests(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<Request>>, ApiError> {
    Ok(Json(state.workflows.requests.list_mine(caller.principal()).await?))
}

async fn get_request(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<RequestDetail>, ApiError> {
    Ok(Json(state.workflows.requests.get(caller.principal(), &RequestId(id)).await?))
}

async fn copy_request(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<NewRequest>, ApiError> {
    Ok(Json(state.workflows.requests.copy_source(caller.principal(), &RequestId(id)).await?))
}

async fn submit_request(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Request>, ApiError> {
    Ok(Json(state.workflows.requests.submit(caller.principal(), &RequestId(id)).await?))
}

async fn provision_request(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ProvisionBody>,
) -> Result<(StatusCode, Json<Vec<VmInstance>>), ApiError> {
    let vms = state
        .workflows
        .provisioning
        .provision(caller.principal(), &RequestId(id), body.placements)
        .await?;
    Ok((StatusCode::CREATED, Json(vms)))
}

async fn pending_approvals(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Approval>>, ApiError> {
    Ok(Json(state.workflows.approvals.pending_for(caller.principal(), query.limit).await?))
}

async fn decide_approval(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<DecisionBody>,
) -> Result<Json<Approval>, ApiError> {
    let principal = caller.principal().ok_or(WorkflowError::Unauthorized)?;
    let decision = ApprovalDecision::parse_verdict(&body.decision).map_err(WorkflowError::from)?;
    let approval = state
        .workflows
        .approvals
        .decide(Some(principal), &ApprovalId(id), decision, body.comments)
        .await?;
    Ok(Json(approval))
}

async fn request_approvals(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<Approval>>, ApiError> {
    let trail = state
        .workflows
        .approvals
        .approvals_for(caller.principal(), ApprovalEntityType::Request, &id)
        .await?;
    Ok(Json(trail))
}

async fn customization_approvals(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<Approval>>, ApiError> {
    let trail = state
        .workflows
        .approvals
        .approvals_for(caller.principal(), ApprovalEntityType::Customization, &id)
        .await?;
    Ok(Json(trail))
}

async fn create_customization(
    State(state): State<ApiState>,
    caller: Caller,
    JsonBody(input): JsonBody<NewCustomization>,
) -> Result<(StatusCode, Json<CustomizationRequest>), ApiError> {
    let customization = state.workflows.customizations.create(caller.principal(), input).await?;
    Ok((StatusCode::CREATED, Json(customization)))
}

async fn apply_customization(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<VmInstance>, ApiError> {
    let vm =
        state.workflows.customizations.apply(caller.principal(), &CustomizationId(id)).await?;
    Ok(Json(vm))
}

async fn list_vms(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<VmQuery>,
) -> Result<Json<Page<VmSummary>>, ApiError> {
    Ok(Json(state.workflows.inventory.list_vms(caller.principal(), &query).await?))
}

async fn vm_detail(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<VmDetail>, ApiError> {
    Ok(Json(state.workflows.inventory.vm_detail(caller.principal(), &VmId(id)).await?))
}

async fn vm_audit(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    let trail =
        state.workflows.inventory.audit_log(caller.principal(), &VmId(id), query.limit).await?;
    Ok(Json(trail))
}

async fn decommission_vm(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Option<JsonBody<DecommissionBody>>,
) -> Result<Json<VmInstance>, ApiError> {
    let reason = body.and_then(|JsonBody(body)| body.reason);
    let vm =
        state.workflows.inventory.decommission(caller.principal(), &VmId(id), reason).await?;
    Ok(Json(vm))
}

async fn list_assets(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<AssetQuery>,
) -> Result<Json<Page<AssetView>>, ApiError> {
    Ok(Json(state.workflows.catalog.list_assets(caller.principal(), &query).await?))
}

async fn get_asset(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<AssetView>, ApiError> {
    Ok(Json(state.workflows.catalog.asset(caller.principal(), &AssetId(id)).await?))
}

async fn create_asset(
    State(state): State<ApiState>,
    caller: Caller,
    JsonBody(input): JsonBody<NewAsset>,
) -> Result<(StatusCode, Json<AssetView>), ApiError> {
    let asset = state.workflows.catalog.create_asset(caller.principal(), input).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

async fn update_asset(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<NewAsset>,
) -> Result<Json<AssetView>, ApiError> {
    Ok(Json(state.workflows.catalog.update_asset(caller.principal(), &AssetId(id), input).await?))
}

async fn delete_asset(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.workflows.catalog.delete_asset(caller.principal(), &AssetId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_licenses(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<LicenseQuery>,
) -> Result<Json<Page<License>>, ApiError> {
    Ok(Json(state.workflows.catalog.list_licenses(caller.principal(), &query).await?))
}

async fn get_license(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<License>, ApiError> {
    Ok(Json(state.workflows.catalog.license(caller.principal(), &LicenseId(id)).await?))
}

async fn create_license(
    State(state): State<ApiState>,
    caller: Caller,
    JsonBody(input): JsonBody<NewLicense>,
) -> Result<(StatusCode, Json<License>), ApiError> {
    let license = state.workflows.catalog.create_license(caller.principal(), input).await?;
    Ok((StatusCode::CREATED, Json(license)))
}

async fn update_license(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<NewLicense>,
) -> Result<Json<License>, ApiError> {
    let license =
        state.workflows.catalog.update_license(caller.principal(), &LicenseId(id), input).await?;
    Ok(Json(license))
}

async fn delete_license(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.workflows.catalog.delete_license(caller.principal(), &LicenseId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_servers(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<PhysicalServer>>, ApiError> {
    Ok(Json(state.workflows.catalog.list_servers(caller.principal()).await?))
}

async fn get_server(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<PhysicalServer>, ApiError> {
    Ok(Json(state.workflows.catalog.server(caller.principal(), &PhysicalServerId(id)).await?))
}

async fn create_server(
    State(state): State<ApiState>,
    caller: Caller,
    JsonBody(input): JsonBody<NewPhysicalServer>,
) -> Result<(StatusCode, Json<PhysicalServer>), ApiError> {
    let server = state.workflows.catalog.create_server(caller.principal(), input).await?;
    Ok((StatusCode::CREATED, Json(server)))
}

async fn update_server(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<NewPhysicalServer>,
) -> Result<Json<PhysicalServer>, ApiError> {
    let server = state
        .workflows
        .catalog
        .update_server(caller.principal(), &PhysicalServerId(id), input)
        .await?;
    Ok(Json(server))
}

async fn delete_server(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.workflows.catalog.delete_server(caller.principal(), &PhysicalServerId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_designations(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<Designation>>, ApiError> {
    Ok(Json(state.workflows.manpower.designations(caller.principal()).await?))
}

async fn list_submissions(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<SubmissionQuery>,
) -> Result<Json<Page<ManpowerSubmission>>, ApiError> {
    Ok(Json(state.workflows.manpower.list(caller.principal(), &query).await?))
}

async fn create_submission(
    State(state): State<ApiState>,
    caller: Caller,
    JsonBody(input): JsonBody<NewSubmission>,
) -> Result<(StatusCode, Json<ManpowerSubmission>), ApiError> {
    let submission = state.workflows.manpower.submit(caller.principal(), input).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

async fn update_submission(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<NewSubmission>,
) -> Result<Json<ManpowerSubmission>, ApiError> {
    let submission =
        state.workflows.manpower.update(caller.principal(), &SubmissionId(id), input).await?;
    Ok(Json(submission))
}
