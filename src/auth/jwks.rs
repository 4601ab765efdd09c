//! Supabase JWT verification
//!
//! RS256 tokens are checked against keys from the project's JWKS endpoint,
//! cached per `kid`. Projects still on the legacy shared secret sign HS256
//! tokens; those are accepted only when a secret is configured.

use anyhow::{bail, Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Claims;

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// One published key. Only RSA keys carry `n`/`e`; EC keys published
/// during signing-key rotation have `crv`/`x`/`y` instead and are skipped.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

/// RSA decoding keys by `kid`; unusable entries are logged and dropped
fn rsa_keys(jwks: JwksResponse) -> Vec<(String, DecodingKey)> {
    jwks.keys
        .into_iter()
        .filter_map(|jwk| {
            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
                tracing::debug!(kty = %jwk.kty, "Skipping JWK without RSA components");
                return None;
            };
            if jwk.kty != "RSA" {
                tracing::debug!(kid = %kid, kty = %jwk.kty, "Skipping non-RSA JWK");
                return None;
            }
            match DecodingKey::from_rsa_components(&n, &e) {
                Ok(key) => Some((kid, key)),
                Err(err) => {
                    tracing::warn!(kid = %kid, error = %err, "Failed to parse JWK");
                    None
                }
            }
        })
        .collect()
}

#[derive(Clone)]
struct CachedKey {
    key: DecodingKey,
    cached_at: Instant,
}

struct JwksCacheInner {
    keys: HashMap<String, CachedKey>,
    last_fetch: Option<Instant>,
}

/// Verifier for Supabase access tokens
#[derive(Clone)]
pub struct JwksCache {
    inner: Arc<RwLock<JwksCacheInner>>,
    http: reqwest::Client,
    jwks_url: String,
    issuer: String,
    audience: String,
    shared_secret: Option<DecodingKey>,
    ttl: Duration,
}

impl JwksCache {
    pub fn new(
        http: reqwest::Client,
        jwks_url: String,
        issuer: String,
        audience: String,
        shared_secret: Option<&str>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(JwksCacheInner {
                keys: HashMap::new(),
                last_fetch: None,
            })),
            http,
            jwks_url,
            issuer,
            audience,
            shared_secret: shared_secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Verify a JWT and return its claims
    pub async fn verify_token(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).context("Invalid JWT header")?;

        let (decoding_key, algorithm) = match header.alg {
            Algorithm::HS256 => {
                let key = self
                    .shared_secret
                    .clone()
                    .context("HS256 token received but no JWT secret is configured")?;
                (key, Algorithm::HS256)
            }
            Algorithm::RS256 => {
                let kid = header.kid.context("JWT missing kid header")?;
                (self.get_or_fetch_key(&kid).await?, Algorithm::RS256)
            }
            other => bail!("Unsupported JWT algorithm: {:?}", other),
        };

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let token_data =
            decode::<Claims>(token, &decoding_key, &validation).context("JWT validation failed")?;

        Ok(token_data.claims)
    }

    async fn get_or_fetch_key(&self, kid: &str) -> Result<DecodingKey> {
        {
            let cache = self.inner.read();
            if let Some(cached) = cache.keys.get(kid) {
                if cached.cached_at.elapsed() < self.ttl {
                    return Ok(cached.key.clone());
                }
            }
        }

        self.refresh_keys().await?;

        let cache = self.inner.read();
        cache
            .keys
            .get(kid)
            .map(|c| c.key.clone())
            .context("Key not found in JWKS")
    }

    async fn refresh_keys(&self) -> Result<()> {
        {
            let cache = self.inner.read();
            if let Some(last) = cache.last_fetch {
                // Rate limit refetches when an unknown kid is presented repeatedly
                if last.elapsed() < Duration::from_secs(1) {
                    return Ok(());
                }
            }
        }

        tracing::debug!(url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http
            .get(&self.jwks_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("Failed to fetch JWKS")?;

        if !response.status().is_success() {
            bail!("JWKS fetch failed with status: {}", response.status());
        }

        let jwks: JwksResponse = response.json().await.context("Failed to parse JWKS")?;
        let keys = rsa_keys(jwks);

        let mut cache = self.inner.write();
        cache.last_fetch = Some(Instant::now());

        for (kid, key) in keys {
            cache.keys.insert(
                kid,
                CachedKey {
                    key,
                    cached_at: Instant::now(),
                },
            );
        }

        tracing::info!(keys = cache.keys.len(), "JWKS cache refreshed");
        Ok(())
    }

    /// Pre-warm the cache by fetching keys
    pub async fn warm_cache(&self) -> Result<()> {
        self.refresh_keys().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const ISSUER: &str = "https://proj.supabase.co/auth/v1";
    const SECRET: &str = "super-secret-jwt-token-with-at-least-32-characters";

    fn verifier(secret: Option<&str>) -> JwksCache {
        JwksCache::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/jwks.json".to_string(),
            ISSUER.to_string(),
            "authenticated".to_string(),
            secret,
            60,
        )
    }

    fn claims(exp_offset: i64) -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: "5b0f1c4e-8f4c-4d4b-9a57-2f1d3c9e7a10".to_string(),
            aud: "authenticated".to_string(),
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + exp_offset,
            email: Some("diner@example.com".to_string()),
            phone: None,
            role: Some("authenticated".to_string()),
            session_id: None,
            user_metadata: None,
        }
    }

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn accepts_hs256_token_signed_with_configured_secret() {
        let token = sign(&claims(3600), SECRET);
        let verified = verifier(Some(SECRET)).verify_token(&token).await.unwrap();
        assert_eq!(verified.email.as_deref(), Some("diner@example.com"));
    }

    #[tokio::test]
    async fn rejects_hs256_without_configured_secret() {
        let token = sign(&claims(3600), SECRET);
        assert!(verifier(None).verify_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn rejects_wrong_secret_and_expired_tokens() {
        let forged = sign(&claims(3600), "another-secret-another-secret-another");
        assert!(verifier(Some(SECRET)).verify_token(&forged).await.is_err());

        let expired = sign(&claims(-3600), SECRET);
        assert!(verifier(Some(SECRET)).verify_token(&expired).await.is_err());
    }

    #[test]
    fn mixed_key_set_keeps_rsa_keys() {
        let jwks: JwksResponse = serde_json::from_str(
            r#"{"keys":[
                {"kid":"ec1","kty":"EC","crv":"P-256","x":"abc","y":"def"},
                {"kid":"rsa1","kty":"RSA","alg":"RS256","use":"sig","n":"sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw","e":"AQAB"}
            ]}"#,
        )
        .unwrap();

        let keys = rsa_keys(jwks);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].0, "rsa1");
    }

    #[tokio::test]
    async fn rejects_foreign_issuer() {
        let mut foreign = claims(3600);
        foreign.iss = "https://other.supabase.co/auth/v1".to_string();
        let token = sign(&foreign, SECRET);
        assert!(verifier(Some(SECRET)).verify_token(&token).await.is_err());
    }
}
