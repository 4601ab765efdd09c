//! Current user profile

use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::profiles::{MeResponse, Profile, UpdateProfileRequest};
use crate::error::ApiError;

const PROFILE_COLUMNS: &str = "id, email, full_name, phone, role, created_at, updated_at";

async fn owned_vendor(state: &AppState, user_id: Uuid) -> Result<Option<Uuid>, ApiError> {
    Ok(sqlx::query_scalar("SELECT id FROM vendors WHERE owner_id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?)
}

/// GET /me
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    // Users created directly in Supabase get a profile on first use
    let profile: Profile = sqlx::query_as(&format!(
        r#"
        INSERT INTO profiles (id, email, role)
        VALUES ($1, $2, 'customer')
        ON CONFLICT (id) DO UPDATE SET id = profiles.id
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(auth.user_id)
    .bind(auth.email.clone().unwrap_or_default())
    .fetch_one(&state.db)
    .await?;

    let vendor_id = owned_vendor(&state, auth.user_id).await?;

    Ok(Json(DataResponse::new(MeResponse::new(profile, vendor_id))))
}

/// PUT /me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(ApiError::bad_request)?;

    let profile: Profile = sqlx::query_as(&format!(
        r#"
        UPDATE profiles
        SET full_name = COALESCE($2, full_name),
            phone = COALESCE($3, phone),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(auth.user_id)
    .bind(req.full_name.as_deref().map(str::trim))
    .bind(req.phone.as_deref().map(str::trim))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    let vendor_id = owned_vendor(&state, auth.user_id).await?;

    Ok(Json(DataResponse::new(MeResponse::new(profile, vendor_id))))
}
