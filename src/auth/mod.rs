use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Registered claims the session core cares about.
///
/// Access tokens are opaque to this crate. When the issuer happens to hand out
/// JWTs these claims let the scheduler refresh ahead of expiry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl TokenClaims {
    pub fn new(subject: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: Some(subject.into()),
            exp: Some((now + ttl).timestamp()),
            iat: Some(now.timestamp()),
        }
    }
}

#[derive(Debug)]
pub enum JwtError {
    TokenGeneration(String),
    InvalidSecret,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::TokenGeneration(msg) => write!(f, "JWT generation error: {}", msg),
            JwtError::InvalidSecret => write!(f, "Invalid JWT secret"),
        }
    }
}

impl std::error::Error for JwtError {}

/// Sign claims with an HMAC secret. Used by issuer stand-ins in tests and demos.
pub fn sign_token(claims: &TokenClaims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Read claims without verifying the signature.
///
/// The issuer is trusted and validates its own tokens; this is only a hint for
/// scheduling. Returns None for anything that is not a JWT.
pub fn peek_claims(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    peek_claims(token)?
        .exp
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

pub fn issued_at(token: &str) -> Option<DateTime<Utc>> {
    peek_claims(token)?
        .iat
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Short, stable, non-reversible label for a token, safe to log
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("tok_{}", &hash[..12])
}
