use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64URL};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ACTION_PURPOSE: &str = "action";
const UNSUBSCRIBE_PURPOSE: &str = "unsubscribe";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token format")]
    Malformed,
    #[error("Invalid token signature")]
    BadSignature,
    #[error("Token expired")]
    Expired,
    #[error("Token segments may not be empty or contain ':'")]
    InvalidSegment,
}

/// Decoded one-click action link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionClaims {
    pub user_id: String,
    pub bookmark_id: String,
    pub action: String,
}

/// Signs and verifies link tokens of the form
/// `base64url(a:b:c).expires_unix.base64url(hmac)`.
///
/// The MAC covers a purpose tag, the encoded payload and the expiry, so an
/// unsubscribe token can never be replayed as an action token.
#[derive(Clone)]
pub struct LinkSigner {
    mac: HmacSha256,
    ttl: Duration,
}

impl LinkSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        Self { mac, ttl }
    }

    pub fn action_token(
        &self,
        user_id: &str,
        bookmark_id: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.sign(ACTION_PURPOSE, [user_id, bookmark_id, action], now)
    }

    pub fn decode_action(&self, token: &str, now: DateTime<Utc>) -> Result<ActionClaims, TokenError> {
        let [user_id, bookmark_id, action] = self.verify(ACTION_PURPOSE, token, now)?;
        Ok(ActionClaims {
            user_id,
            bookmark_id,
            action,
        })
    }

    pub fn unsubscribe_token(&self, user_id: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let issued = now.timestamp_millis().to_string();
        self.sign(UNSUBSCRIBE_PURPOSE, ["unsubscribe", user_id, &issued], now)
    }

    /// Returns the user id carried by an unsubscribe token.
    pub fn decode_unsubscribe(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let [kind, user_id, _issued] = self.verify(UNSUBSCRIBE_PURPOSE, token, now)?;
        if kind != "unsubscribe" {
            return Err(TokenError::Malformed);
        }
        Ok(user_id)
    }

    fn sign(&self, purpose: &str, parts: [&str; 3], now: DateTime<Utc>) -> Result<String, TokenError> {
        if parts.iter().any(|p| p.is_empty() || p.contains(':')) {
            return Err(TokenError::InvalidSegment);
        }
        Ok(self.sign_payload(purpose, &parts.join(":"), now))
    }

    fn sign_payload(&self, purpose: &str, payload: &str, now: DateTime<Utc>) -> String {
        let encoded = B64URL.encode(payload);
        let expires = (now + self.ttl).timestamp();
        let signature = B64URL.encode(self.keyed(purpose, &encoded, expires).finalize().into_bytes());
        format!("{encoded}.{expires}.{signature}")
    }

    fn verify(&self, purpose: &str, token: &str, now: DateTime<Utc>) -> Result<[String; 3], TokenError> {
        let mut pieces = token.trim().split('.');
        let (Some(encoded), Some(expires), Some(signature), None) =
            (pieces.next(), pieces.next(), pieces.next(), pieces.next())
        else {
            return Err(TokenError::Malformed);
        };

        let expires: i64 = expires.parse().map_err(|_| TokenError::Malformed)?;
        let signature = B64URL.decode(signature).map_err(|_| TokenError::Malformed)?;

        self.keyed(purpose, encoded, expires)
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        if now.timestamp() > expires {
            return Err(TokenError::Expired);
        }

        let payload = B64URL.decode(encoded).map_err(|_| TokenError::Malformed)?;
        let payload = String::from_utf8(payload).map_err(|_| TokenError::Malformed)?;
        split_payload(&payload)
    }

    fn keyed(&self, purpose: &str, encoded: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(purpose.as_bytes());
        mac.update(b"|");
        mac.update(format!("{encoded}.{expires}").as_bytes());
        mac
    }
}

/// Split a decoded payload into exactly three `:`-separated segments.
pub fn split_payload(payload: &str) -> Result<[String; 3], TokenError> {
    let parts: Vec<&str> = payload.split(':').collect();
    match parts.as_slice() {
        [a, b, c] => Ok([a.to_string(), b.to_string(), c.to_string()]),
        _ => Err(TokenError::Malformed),
    }
}
