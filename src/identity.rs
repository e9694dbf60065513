//! Verified identity returned by the auth service.
//!
//! The verify endpoint answers either with the claims object itself
//! (`{"sub": .., "username": ..}`) or with the claims nested one level down
//! (`{"user": {"sub": ..}}`). Both are folded into one [`VerifiedIdentity`]
//! right after verification so handlers never look at the raw shape.

use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    /// Subject id, forwarded to backends as `X-User-Id`
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
    /// Body exactly as the auth service returned it
    pub payload: Value,
}

impl VerifiedIdentity {
    /// Normalize a verify response into a canonical identity.
    ///
    /// Every claim is looked up in the nested `user` object first, then at the
    /// top level. Any JSON object is accepted; only non-objects are rejected.
    pub fn from_payload(payload: Value) -> Result<Self, AppError> {
        if !payload.is_object() {
            return Err(AppError::TokenInvalid(
                "verify response is not a JSON object".to_string(),
            ));
        }

        let scopes: Vec<&Value> = match payload.get("user") {
            Some(nested @ Value::Object(_)) => vec![nested, &payload],
            _ => vec![&payload],
        };

        let user_id = ["sub", "id", "userId", "user_id"].iter().find_map(|key| {
            scopes
                .iter()
                .find_map(|claims| claims.get(*key).and_then(id_string))
        });
        let string_claim = |key: &str| scopes.iter().find_map(|claims| string_field(claims, key));
        let int_claim = |key: &str| {
            scopes
                .iter()
                .find_map(|claims| claims.get(key).and_then(Value::as_i64))
        };

        Ok(Self {
            user_id,
            username: string_claim("username"),
            email: string_claim("email"),
            role: string_claim("role"),
            issued_at: int_claim("iat"),
            expires_at: int_claim("exp"),
            payload,
        })
    }

    /// Subject id for calls that act on the user's own resources
    pub fn require_user_id(&self) -> Result<&str, AppError> {
        self.user_id.as_deref().ok_or(AppError::MissingUserId)
    }
}

/// Subject ids come back as strings or numbers depending on the user store
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(claims: &Value, key: &str) -> Option<String> {
    claims.get(key).and_then(Value::as_str).map(str::to_string)
}
