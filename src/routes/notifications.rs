//! Notification routes
//!
//! In-app notifications for the signed-in user: list, mark read, delete.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::notifications::{
    MarkedReadResponse, Notification, NotificationQuery, NotificationResponse,
    UnreadCountResponse,
};
use crate::error::ApiError;

/// GET /notifications
///
/// Newest first, optionally only unread or of one type.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<NotificationQuery>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let unread_only = query.unread_only.unwrap_or(false);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM notifications
        WHERE user_id = $1
        AND ($2::bool = false OR is_read = false)
        AND ($3::text IS NULL OR type = $3)
        "#,
    )
    .bind(auth.user_id)
    .bind(unread_only)
    .bind(&query.notification_type)
    .fetch_one(&state.db)
    .await?;

    let rows: Vec<Notification> = sqlx::query_as(
        r#"
        SELECT id, user_id, type, title, message, data, is_read, read_at, created_at
        FROM notifications
        WHERE user_id = $1
        AND ($2::bool = false OR is_read = false)
        AND ($3::text IS NULL OR type = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(auth.user_id)
    .bind(unread_only)
    .bind(&query.notification_type)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data: Vec<NotificationResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Paginated::new(data, &pagination, total))
}

/// GET /notifications/unread-count
pub async fn get_unread_count(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = false",
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(DataResponse::new(UnreadCountResponse { count })))
}

/// PUT /notifications/:id/read
///
/// Marking an already-read notification again is a no-op.
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let row: Notification = sqlx::query_as(
        r#"
        UPDATE notifications
        SET is_read = true, read_at = COALESCE(read_at, NOW())
        WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, type, title, message, data, is_read, read_at, created_at
        "#,
    )
    .bind(notification_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Notification not found"))?;

    Ok(Json(DataResponse::new(NotificationResponse::from(row))))
}

/// PUT /notifications/read-all
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET is_read = true, read_at = NOW()
        WHERE user_id = $1 AND is_read = false
        "#,
    )
    .bind(auth.user_id)
    .execute(&state.db)
    .await?;

    Ok(Json(DataResponse::new(MarkedReadResponse {
        updated: result.rows_affected(),
    })))
}

/// DELETE /notifications/:id
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(notification_id)
        .bind(auth.user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
