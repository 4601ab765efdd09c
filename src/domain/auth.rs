//! Authentication domain types
//!
//! Requests and responses for the Supabase Auth proxy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::profiles::UserRole;

/// Roles a user may pick at signup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignupRole {
    #[default]
    Customer,
    Vendor,
}

impl SignupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Vendor => "vendor",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: SignupRole,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Required when signing up as a vendor
    #[serde(default)]
    pub vendor_name: Option<String>,
}

impl SignUpRequest {
    pub fn validate(&self) -> Result<(), String> {
        if !self.email.contains('@') || self.email.trim().len() < 3 {
            return Err("A valid email is required".to_string());
        }
        if self.password.len() < 6 {
            return Err("Password must be at least 6 characters".to_string());
        }
        if self.role == SignupRole::Vendor
            && self.vendor_name.as_deref().map_or(true, |n| n.trim().is_empty())
        {
            return Err("vendor_name is required for vendor accounts".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub created_at: Option<DateTime<Utc>>,
}

/// Tokens for signin or auto-confirmed signup
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: User,
}

/// Signup response when email confirmation is required
#[derive(Debug, Clone, Serialize)]
pub struct SignupPendingResponse {
    pub user_id: String,
    pub email: String,
    pub confirmation_required: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub access_token: String,
    pub expires_at: i64,
}

// Supabase Auth API response types

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseAuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: SupabaseUser,
}

/// Signup with email confirmation pending returns only the user object
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseSignupResponse {
    pub id: String,
    pub email: Option<String>,
    pub created_at: Option<String>,
    pub confirmation_sent_at: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseUser {
    pub id: String,
    pub email: Option<String>,
    pub created_at: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
}

impl SupabaseUser {
    pub fn role(&self) -> UserRole {
        role_from_metadata(self.user_metadata.as_ref())
    }
}

/// Supabase error body; newer and legacy fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupabaseErrorResponse {
    pub code: Option<i32>,
    pub error_code: Option<String>,
    pub msg: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub message: Option<String>,
}

impl SupabaseErrorResponse {
    pub fn with_error(error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn get_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "Unknown authentication error".to_string())
    }
}

pub fn role_from_metadata(metadata: Option<&serde_json::Value>) -> UserRole {
    metadata
        .and_then(|m| m.get("role"))
        .and_then(|v| v.as_str())
        .map(UserRole::from_db)
        .unwrap_or_default()
}

impl From<SupabaseUser> for User {
    fn from(su: SupabaseUser) -> Self {
        let role = su.role();
        Self {
            id: su.id,
            email: su.email,
            role,
            created_at: su.created_at.and_then(|s| s.parse().ok()),
        }
    }
}

impl From<SupabaseSignupResponse> for SignupPendingResponse {
    fn from(sr: SupabaseSignupResponse) -> Self {
        Self {
            user_id: sr.id,
            email: sr.email.unwrap_or_default(),
            confirmation_required: sr.confirmation_sent_at.is_some(),
            message: "Please check your email to confirm your account.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signup(role: SignupRole, vendor_name: Option<&str>) -> SignUpRequest {
        SignUpRequest {
            email: "chef@example.com".to_string(),
            password: "secret123".to_string(),
            role,
            full_name: None,
            phone: None,
            vendor_name: vendor_name.map(str::to_string),
        }
    }

    #[test]
    fn vendor_signup_needs_a_name() {
        assert!(signup(SignupRole::Customer, None).validate().is_ok());
        assert!(signup(SignupRole::Vendor, None).validate().is_err());
        assert!(signup(SignupRole::Vendor, Some(" ")).validate().is_err());
        assert!(signup(SignupRole::Vendor, Some("Dosa Corner")).validate().is_ok());
    }

    #[test]
    fn error_message_prefers_newest_field() {
        let err: SupabaseErrorResponse = serde_json::from_value(json!({
            "msg": "Email not confirmed",
            "error": "invalid_grant"
        }))
        .unwrap();
        assert_eq!(err.get_message(), "Email not confirmed");
        assert_eq!(
            SupabaseErrorResponse::with_error("Invalid credentials").get_message(),
            "Invalid credentials"
        );
    }

    #[test]
    fn role_is_read_from_user_metadata() {
        let meta = json!({"role": "vendor"});
        assert_eq!(role_from_metadata(Some(&meta)), UserRole::Vendor);
        assert_eq!(role_from_metadata(None), UserRole::Customer);
    }
}
