//! User provisioning and deletion endpoints.
//!
//! Each creation handler starts a saga and blocks on its wait handle for
//! a bounded ceiling. Three outcomes map to three statuses: resolved
//! success (201), resolved failure (400 with the failure reason), and
//! timeout (202 with the speculative result — the saga keeps running and
//! resolves on its own).

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use common::{BranchId, BusinessRoleId, UserId};
use domain::{EmploymentType, Money, PayType, ProficiencyLevel, Role, RoleDetails};
use identity::{
    IdentityStore, NewUserRequest, ProvisioningService, StartedSaga, WaitResult,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<I: IdentityStore> {
    pub service: ProvisioningService<I>,
    pub wait_ceiling: Duration,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateManagerRequest {
    pub email: String,
    pub fullname: String,
    pub phone_number: String,
    pub branch_id: i64,
    pub hire_date: NaiveDate,
    pub identity_card: String,
}

#[derive(Deserialize)]
pub struct CreateStaffRequest {
    pub email: String,
    pub fullname: String,
    pub phone_number: String,
    pub branch_id: i64,
    pub identity_card: String,
    pub hire_date: NaiveDate,
    pub employment_type: Option<EmploymentType>,
    pub pay_type: Option<PayType>,
    pub base_salary_cents: Option<i64>,
    pub insurance_salary_cents: Option<i64>,
    pub number_of_dependents: Option<u32>,
    pub hourly_rate_cents: Option<i64>,
    pub overtime_rate_cents: Option<i64>,
    #[serde(default)]
    pub business_role_ids: Vec<i64>,
    pub proficiency_level: Option<ProficiencyLevel>,
}

#[derive(Deserialize)]
pub struct CreateCustomerRequest {
    pub email: String,
    pub fullname: String,
    pub phone_number: String,
    pub dob: NaiveDate,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProvisioningResponse {
    pub user_id: String,
    pub saga_id: String,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct RejectionResponse {
    pub error: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub fullname: String,
    pub phone_number: String,
    pub role: String,
    pub status: String,
}

// -- Handlers --

/// POST /users/managers — provision a manager.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn create_manager<I: IdentityStore + 'static>(
    State(state): State<Arc<AppState<I>>>,
    Json(req): Json<CreateManagerRequest>,
) -> Result<Response, ApiError> {
    let request = NewUserRequest {
        email: req.email,
        fullname: req.fullname,
        phone_number: req.phone_number,
        details: RoleDetails::Manager {
            branch_id: BranchId::new(req.branch_id),
            hire_date: req.hire_date,
            identity_card: req.identity_card,
        },
    };

    let started = state.service.begin_creation(request).await?;
    Ok(await_creation(&state, started).await)
}

/// POST /users/staff — provision a staff member.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn create_staff<I: IdentityStore + 'static>(
    State(state): State<Arc<AppState<I>>>,
    Json(req): Json<CreateStaffRequest>,
) -> Result<Response, ApiError> {
    let request = NewUserRequest {
        email: req.email,
        fullname: req.fullname,
        phone_number: req.phone_number,
        details: RoleDetails::Staff {
            branch_id: BranchId::new(req.branch_id),
            identity_card: req.identity_card,
            hire_date: req.hire_date,
            employment_type: req.employment_type.unwrap_or_default(),
            pay_type: req.pay_type,
            base_salary: req.base_salary_cents.map(Money::from_cents),
            insurance_salary: req.insurance_salary_cents.map(Money::from_cents),
            number_of_dependents: req.number_of_dependents,
            hourly_rate: req.hourly_rate_cents.map(Money::from_cents),
            overtime_rate: req.overtime_rate_cents.map(Money::from_cents),
            business_role_ids: req
                .business_role_ids
                .into_iter()
                .map(BusinessRoleId::new)
                .collect(),
            proficiency_level: req.proficiency_level.unwrap_or_default(),
        },
    };

    let started = state.service.begin_creation(request).await?;
    Ok(await_creation(&state, started).await)
}

/// POST /users/customers — provision a customer.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn create_customer<I: IdentityStore + 'static>(
    State(state): State<Arc<AppState<I>>>,
    Json(req): Json<CreateCustomerRequest>,
) -> Result<Response, ApiError> {
    let request = NewUserRequest {
        email: req.email,
        fullname: req.fullname,
        phone_number: req.phone_number,
        details: RoleDetails::Customer {
            dob: req.dob,
            avatar_url: req.avatar_url,
            bio: req.bio,
        },
    };

    let started = state.service.begin_creation(request).await?;
    Ok(await_creation(&state, started).await)
}

/// DELETE /users/managers/:id — delete a manager and their profile.
#[tracing::instrument(skip(state))]
pub async fn delete_manager<I: IdentityStore + 'static>(
    State(state): State<Arc<AppState<I>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user_id = parse_user_id(&id)?;
    let started = state.service.begin_deletion(user_id, Role::Manager).await?;
    Ok(await_deletion(&state, started).await)
}

/// DELETE /users/staff/:id — delete a staff member and their profile.
#[tracing::instrument(skip(state))]
pub async fn delete_staff<I: IdentityStore + 'static>(
    State(state): State<Arc<AppState<I>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user_id = parse_user_id(&id)?;
    let started = state.service.begin_deletion(user_id, Role::Staff).await?;
    Ok(await_deletion(&state, started).await)
}

/// GET /users/:id — load an identity row by ID.
#[tracing::instrument(skip(state))]
pub async fn get_user<I: IdentityStore + 'static>(
    State(state): State<Arc<AppState<I>>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = parse_user_id(&id)?;
    let user = state
        .service
        .store()
        .get(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))?;

    Ok(Json(UserResponse {
        id: user.id.to_string(),
        email: user.email,
        fullname: user.fullname,
        phone_number: user.phone_number,
        role: user.role.to_string(),
        status: user.status.to_string(),
    }))
}

// -- Wait plumbing --

async fn await_creation<I: IdentityStore>(state: &AppState<I>, started: StartedSaga) -> Response {
    await_saga(state, started, StatusCode::CREATED, "created").await
}

async fn await_deletion<I: IdentityStore>(state: &AppState<I>, started: StartedSaga) -> Response {
    await_saga(state, started, StatusCode::OK, "deleted").await
}

async fn await_saga<I: IdentityStore>(
    state: &AppState<I>,
    started: StartedSaga,
    resolved_status: StatusCode,
    resolved_label: &'static str,
) -> Response {
    let StartedSaga {
        saga_id,
        user_id,
        handle,
    } = started;

    let wait_start = std::time::Instant::now();
    let result = handle.wait(state.wait_ceiling).await;
    metrics::histogram!("saga_wait_seconds").record(wait_start.elapsed().as_secs_f64());

    match result {
        WaitResult::Completed { user_id } => (
            resolved_status,
            Json(ProvisioningResponse {
                user_id: user_id.to_string(),
                saga_id: saga_id.to_string(),
                status: resolved_label,
            }),
        )
            .into_response(),
        WaitResult::Failed { code, reason } => (
            StatusCode::BAD_REQUEST,
            Json(RejectionResponse {
                error: reason,
                code: code.as_str().to_string(),
            }),
        )
            .into_response(),
        WaitResult::TimedOut => {
            metrics::counter!("saga_wait_timeouts_total").increment(1);
            tracing::info!(%saga_id, %user_id, "wait ceiling elapsed, saga continues asynchronously");
            (
                StatusCode::ACCEPTED,
                Json(ProvisioningResponse {
                    user_id: user_id.to_string(),
                    saga_id: saga_id.to_string(),
                    status: "processing",
                }),
            )
                .into_response()
        }
    }
}

fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid user id: {e}")))?;
    Ok(UserId::from_uuid(uuid))
}
