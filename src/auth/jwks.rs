//! JWKS cache for Supabase-issued access tokens

use anyhow::{Context, Result};
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

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Clone)]
struct CachedKey {
    key: DecodingKey,
    cached_at: Instant,
}

/// Verifies RS256 tokens against the identity provider's published keys.
///
/// Keys are cached by `kid` for `ttl`; an unknown `kid` triggers a refetch,
/// throttled to one request per second.
#[derive(Clone)]
pub struct JwksCache {
    inner: Arc<RwLock<JwksCacheInner>>,
    http: reqwest::Client,
    jwks_url: String,
    issuer: String,
    audience: String,
    ttl: Duration,
}

struct JwksCacheInner {
    keys: HashMap<String, CachedKey>,
    last_fetch: Option<Instant>,
}

impl JwksCache {
    pub fn new(
        http: reqwest::Client,
        jwks_url: String,
        issuer: String,
        audience: String,
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
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Verify a JWT and return its claims
    pub async fn verify_token(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).context("Invalid JWT header")?;
        let kid = header.kid.context("JWT missing kid header")?;

        let decoding_key = self.get_or_fetch_key(&kid).await?;

        let token_data = decode::<Claims>(token, &decoding_key, &self.validation())
            .context("JWT validation failed")?;

        Ok(token_data.claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation
    }

    fn cached_key(&self, kid: &str) -> Option<DecodingKey> {
        let cache = self.inner.read();
        cache
            .keys
            .get(kid)
            .filter(|cached| cached.cached_at.elapsed() < self.ttl)
            .map(|cached| cached.key.clone())
    }

    async fn get_or_fetch_key(&self, kid: &str) -> Result<DecodingKey> {
        if let Some(key) = self.cached_key(kid) {
            return Ok(key);
        }

        self.refresh_keys().await?;

        self.cached_key(kid).context("Key not found in JWKS")
    }

    async fn refresh_keys(&self) -> Result<()> {
        {
            let cache = self.inner.read();
            if let Some(last) = cache.last_fetch {
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
            anyhow::bail!("JWKS fetch failed with status: {}", response.status());
        }

        let jwks: JwksResponse = response.json().await.context("Failed to parse JWKS")?;
        let count = self.store_keys(jwks.keys);

        tracing::info!(keys = count, "JWKS cache refreshed");
        Ok(())
    }

    /// Replace cached keys with the RSA keys from a JWKS document.
    fn store_keys(&self, keys: Vec<Jwk>) -> usize {
        let now = Instant::now();
        let mut cache = self.inner.write();
        cache.last_fetch = Some(now);
        cache.keys.clear();

        for jwk in keys {
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                continue;
            };
            if jwk.kty != "RSA" {
                continue;
            }

            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    cache.keys.insert(jwk.kid, CachedKey { key, cached_at: now });
                }
                Err(err) => {
                    tracing::warn!(kid = %jwk.kid, error = %err, "Skipping malformed JWK");
                }
            }
        }

        cache.keys.len()
    }

    /// Fetch keys ahead of the first request
    pub async fn warm_cache(&self) -> Result<()> {
        self.refresh_keys().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> JwksCache {
        JwksCache::new(
            reqwest::Client::new(),
            "http://localhost/jwks".to_string(),
            "issuer".to_string(),
            "authenticated".to_string(),
            60,
        )
    }

    #[test]
    fn only_rsa_keys_are_cached() {
        let jwks: JwksResponse = serde_json::from_value(serde_json::json!({
            "keys": [
                { "kid": "rsa-1", "kty": "RSA", "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbg", "e": "AQAB" },
                { "kid": "ec-1", "kty": "EC", "crv": "P-256", "x": "a", "y": "b" },
                { "kid": "bad", "kty": "RSA" }
            ]
        }))
        .unwrap();

        let cache = cache();
        assert_eq!(cache.store_keys(jwks.keys), 1);
        assert!(cache.cached_key("rsa-1").is_some());
        assert!(cache.cached_key("ec-1").is_none());
        assert!(cache.cached_key("bad").is_none());
    }

    #[tokio::test]
    async fn garbage_token_is_rejected_without_fetching() {
        let err = cache().verify_token("not-a-jwt").await.unwrap_err();
        assert!(err.to_string().contains("Invalid JWT header"));
    }
}
