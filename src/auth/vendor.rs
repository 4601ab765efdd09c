//! Vendor dashboard access

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{middleware::AuthError, RequireAuth};
use crate::app::AppState;
use crate::error::ErrorResponse;

/// Extractor for routes that act on the caller's own vendor.
/// Resolves the vendor owned by the authenticated user.
#[derive(Debug, Clone)]
pub struct RequireVendor {
    pub auth: RequireAuth,
    pub vendor_id: Uuid,
}

impl RequireVendor {
    pub fn user_id(&self) -> Uuid {
        self.auth.user_id
    }
}

#[derive(Debug)]
pub enum VendorAuthError {
    NotAuthenticated(AuthError),
    NotVendor,
    DatabaseError(String),
}

impl IntoResponse for VendorAuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            VendorAuthError::NotAuthenticated(inner) => return inner.into_response(),
            VendorAuthError::NotVendor => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Vendor account required",
            ),
            VendorAuthError::DatabaseError(e) => {
                tracing::error!(error = %e, "Vendor lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred",
                )
            }
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        };

        (status, Json(body)).into_response()
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireVendor {
    type Rejection = VendorAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth = RequireAuth::from_request_parts(parts, state)
            .await
            .map_err(VendorAuthError::NotAuthenticated)?;

        let vendor_id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM vendors WHERE owner_id = $1")
                .bind(auth.user_id)
                .fetch_optional(&state.db)
                .await
                .map_err(|e| VendorAuthError::DatabaseError(e.to_string()))?;

        let Some(vendor_id) = vendor_id else {
            tracing::warn!(user_id = %auth.user_id, "Non-vendor user attempted to access vendor route");
            return Err(VendorAuthError::NotVendor);
        };

        Ok(RequireVendor { auth, vendor_id })
    }
}
