//! Profile domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Customer,
    Vendor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Vendor => "vendor",
            Self::Admin => "admin",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "vendor" => Self::Vendor,
            "admin" => Self::Admin,
            _ => Self::Customer,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub vendor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl MeResponse {
    pub fn new(profile: Profile, vendor_id: Option<Uuid>) -> Self {
        Self {
            id: profile.id,
            email: profile.email,
            full_name: profile.full_name,
            phone: profile.phone,
            role: UserRole::from_db(&profile.role),
            vendor_id,
            created_at: profile.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.full_name {
            if name.trim().is_empty() || name.chars().count() > 100 {
                return Err("full_name must be between 1 and 100 characters".to_string());
            }
        }
        if let Some(phone) = &self.phone {
            if !is_valid_phone(phone) {
                return Err("phone must contain 10 to 15 digits".to_string());
            }
        }
        Ok(())
    }
}

/// Accepts an optional leading `+`, spaces and dashes around 10-15 digits
pub fn is_valid_phone(phone: &str) -> bool {
    let body = phone.trim().strip_prefix('+').unwrap_or(phone.trim());
    if !body.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-') {
        return false;
    }
    let digits = body.chars().filter(char::is_ascii_digit).count();
    (10..=15).contains(&digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers() {
        assert!(is_valid_phone("+91 98765-43210"));
        assert!(is_valid_phone("9876543210"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("98765abc10"));
    }

    #[test]
    fn unknown_roles_fall_back_to_customer() {
        assert_eq!(UserRole::from_db("vendor"), UserRole::Vendor);
        assert_eq!(UserRole::from_db("superuser"), UserRole::Customer);
    }
}
