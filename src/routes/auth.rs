//! Authentication routes
//!
//! These routes proxy authentication requests to Supabase Auth and keep the
//! local profile (and, for vendors, the storefront) in step.

use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::auth::{
    AuthResponse, RefreshTokenRequest, SessionResponse, SignInRequest, SignUpRequest,
    SignupPendingResponse, SignupRole, SupabaseAuthResponse, SupabaseErrorResponse,
    SupabaseSignupResponse, SupabaseUser, User,
};
use crate::domain::queue::{DEFAULT_AVG_PREPARATION_MINUTES, DEFAULT_MAX_ACTIVE_ORDERS};
use crate::error::ApiError;

async fn supabase_error(response: reqwest::Response, fallback: &str) -> String {
    response
        .json::<SupabaseErrorResponse>()
        .await
        .unwrap_or_else(|_| SupabaseErrorResponse::with_error(fallback))
        .get_message()
}

fn parse_user_id(id: &str) -> Result<Uuid, ApiError> {
    id.parse()
        .map_err(|_| ApiError::internal("Invalid user ID from auth service"))
}

/// Create the profile and, for vendor accounts, the vendor row with default
/// queue settings.
async fn create_account(state: &AppState, user_id: Uuid, req: &SignUpRequest) -> Result<(), ApiError> {
    let mut tx = state.db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO profiles (id, email, full_name, phone, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        ON CONFLICT (id) DO UPDATE SET
            email = EXCLUDED.email,
            role = EXCLUDED.role,
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(&req.email)
    .bind(&req.full_name)
    .bind(&req.phone)
    .bind(req.role.as_str())
    .execute(&mut *tx)
    .await?;

    if req.role == SignupRole::Vendor {
        let vendor_name = req.vendor_name.as_deref().unwrap_or_default().trim();

        let vendor_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO vendors (owner_id, name)
            VALUES ($1, $2)
            ON CONFLICT (owner_id) DO UPDATE SET updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(vendor_name)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO queue_settings (vendor_id, max_active_orders, avg_preparation_minutes)
            VALUES ($1, $2, $3)
            ON CONFLICT (vendor_id) DO NOTHING
            "#,
        )
        .bind(vendor_id)
        .bind(DEFAULT_MAX_ACTIVE_ORDERS)
        .bind(DEFAULT_AVG_PREPARATION_MINUTES)
        .execute(&mut *tx)
        .await?;

        tracing::info!(user_id = %user_id, vendor_id = %vendor_id, "Vendor account created");
    }

    tx.commit().await?;
    Ok(())
}

/// POST /auth/signup
///
/// Register with Supabase and create the local profile.
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(ApiError::bad_request)?;

    let supabase_req = serde_json::json!({
        "email": req.email,
        "password": req.password,
        "data": {
            "role": req.role.as_str(),
            "full_name": req.full_name,
        }
    });

    let response = state
        .http_client
        .post(format!("{}/auth/v1/signup", state.settings.supabase_url))
        .header("apikey", &state.settings.supabase_anon_key)
        .json(&supabase_req)
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to connect to auth service: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::bad_request(supabase_error(response, "Signup failed").await));
    }

    let response_text = response
        .text()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read auth response: {}", e)))?;

    // Tokens come back directly when email confirmation is disabled
    if let Ok(auth_response) = serde_json::from_str::<SupabaseAuthResponse>(&response_text) {
        let user_id = parse_user_id(&auth_response.user.id)?;
        create_account(&state, user_id, &req).await?;

        let body = serde_json::to_value(AuthResponse {
            access_token: auth_response.access_token,
            refresh_token: auth_response.refresh_token,
            expires_in: auth_response.expires_in,
            user: auth_response.user.into(),
        })
        .map_err(|e| ApiError::internal(e.to_string()))?;
        return Ok(Created(body));
    }

    if let Ok(signup_response) = serde_json::from_str::<SupabaseSignupResponse>(&response_text) {
        let user_id = parse_user_id(&signup_response.id)?;
        create_account(&state, user_id, &req).await?;

        let pending: SignupPendingResponse = signup_response.into();
        let body =
            serde_json::to_value(pending).map_err(|e| ApiError::internal(e.to_string()))?;
        return Ok(Created(body));
    }

    Err(ApiError::internal("Failed to parse auth response: unexpected format"))
}

/// POST /auth/signin
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .http_client
        .post(format!(
            "{}/auth/v1/token?grant_type=password",
            state.settings.supabase_url
        ))
        .header("apikey", &state.settings.supabase_anon_key)
        .json(&serde_json::json!({
            "email": req.email,
            "password": req.password
        }))
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to connect to auth service: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::unauthorized(
            supabase_error(response, "Invalid credentials").await,
        ));
    }

    let auth_response: SupabaseAuthResponse = response
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to parse auth response: {}", e)))?;

    // Users created directly in Supabase get a profile on first sign in
    let user_id = parse_user_id(&auth_response.user.id)?;
    sqlx::query(
        r#"
        INSERT INTO profiles (id, email, role, created_at, updated_at)
        VALUES ($1, $2, $3, NOW(), NOW())
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(&req.email)
    .bind(auth_response.user.role().as_str())
    .execute(&state.db)
    .await?;

    Ok(Json(DataResponse::new(AuthResponse {
        access_token: auth_response.access_token,
        refresh_token: auth_response.refresh_token,
        expires_in: auth_response.expires_in,
        user: auth_response.user.into(),
    })))
}

/// POST /auth/signout
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .http_client
        .post(format!("{}/auth/v1/logout", state.settings.supabase_url))
        .header("apikey", &state.settings.supabase_anon_key)
        .bearer_auth(auth.token())
        .send()
        .await;

    if let Err(e) = result {
        tracing::warn!(user_id = %auth.user_id, error = %e, "Supabase logout failed");
    }

    Ok(MessageResponse::new("Signed out"))
}

/// GET /auth/session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .http_client
        .get(format!("{}/auth/v1/user", state.settings.supabase_url))
        .header("apikey", &state.settings.supabase_anon_key)
        .bearer_auth(auth.token())
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to fetch user: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::unauthorized("Invalid session"));
    }

    let supabase_user: SupabaseUser = response
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to parse user response: {}", e)))?;

    let user: User = supabase_user.into();
    Ok(Json(DataResponse::new(SessionResponse {
        user,
        access_token: auth.token().to_string(),
        expires_at: auth.claims().exp,
    })))
}

/// POST /auth/refresh
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .http_client
        .post(format!(
            "{}/auth/v1/token?grant_type=refresh_token",
            state.settings.supabase_url
        ))
        .header("apikey", &state.settings.supabase_anon_key)
        .json(&serde_json::json!({
            "refresh_token": req.refresh_token
        }))
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to connect to auth service: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::unauthorized(
            supabase_error(response, "Invalid refresh token").await,
        ));
    }

    let auth_response: SupabaseAuthResponse = response
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to parse auth response: {}", e)))?;

    Ok(Json(DataResponse::new(AuthResponse {
        access_token: auth_response.access_token,
        refresh_token: auth_response.refresh_token,
        expires_in: auth_response.expires_in,
        user: auth_response.user.into(),
    })))
}
