use uuid::Uuid;

use super::Claims;

/// Authenticated caller, built from verified JWT claims
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Option<String>,
    token: String,
    claims: Claims,
}

impl AuthContext {
    pub fn from_claims(claims: Claims, token: &str) -> Result<Self, &'static str> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token")?;

        Ok(Self {
            user_id,
            email: claims.email.clone(),
            role: claims.role.clone(),
            token: token.to_string(),
            claims,
        })
    }

    /// Raw bearer token, forwarded to Supabase Auth
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }
}
