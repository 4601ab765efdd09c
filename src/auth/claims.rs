use serde::{Deserialize, Serialize};

/// Claims carried by a Supabase access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Auth user id
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    /// Postgres role Supabase assigns (`authenticated`, `anon`, ...)
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub user_metadata: Option<serde_json::Value>,
}
