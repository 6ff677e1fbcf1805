use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use sha2::Sha256;
use tracing::warn;

use session_cell::{ParticipantRole, SessionId};

use crate::error::VideoServiceError;

const TOKEN_TTL_HOURS: i64 = 4;

/// Pluggable join-token strategy. Vendors that require a signed token get
/// one; the explicit unauthenticated mode produces none.
pub trait JoinTokenSigner: Send + Sync {
    fn sign(
        &self,
        session_id: &SessionId,
        participant_name: &str,
        role: ParticipantRole,
    ) -> Result<Option<String>, VideoServiceError>;

    fn mode(&self) -> &'static str;
}

#[derive(Serialize)]
struct JwtClaims {
    app_key: String,
    tpc: String,
    user_identity: String,
    role_type: u8,
    iat: i64,
    exp: i64,
}

/// HS256 JWT signer in the shape Zoom-style SDKs expect.
pub struct JwtTokenSigner {
    app_id: String,
    secret: String,
}

impl JwtTokenSigner {
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            secret: secret.into(),
        }
    }
}

impl JoinTokenSigner for JwtTokenSigner {
    fn sign(
        &self,
        session_id: &SessionId,
        participant_name: &str,
        role: ParticipantRole,
    ) -> Result<Option<String>, VideoServiceError> {
        let now = Utc::now();
        let claims = JwtClaims {
            app_key: self.app_id.clone(),
            tpc: session_id.to_string(),
            user_identity: participant_name.to_string(),
            role_type: match role {
                ParticipantRole::Coach => 1,
                ParticipantRole::Student => 0,
            },
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| VideoServiceError::Initialization(format!("token signing failed: {}", e)))?;

        Ok(Some(token))
    }

    fn mode(&self) -> &'static str {
        "jwt"
    }
}

/// HMAC-SHA256 signer in the shape Agora-style SDKs expect:
/// `base64(payload).base64(signature)`.
pub struct HmacTokenSigner {
    app_id: String,
    secret: String,
}

impl HmacTokenSigner {
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            secret: secret.into(),
        }
    }
}

impl JoinTokenSigner for HmacTokenSigner {
    fn sign(
        &self,
        session_id: &SessionId,
        participant_name: &str,
        role: ParticipantRole,
    ) -> Result<Option<String>, VideoServiceError> {
        let expires = (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp();
        let payload = format!(
            "{}:{}:{}:{}:{}",
            self.app_id,
            session_id,
            participant_name,
            match role {
                ParticipantRole::Coach => "coach",
                ParticipantRole::Student => "student",
            },
            expires
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .map_err(|e| VideoServiceError::Initialization(format!("invalid HMAC key: {}", e)))?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        let token = format!(
            "{}.{}",
            general_purpose::URL_SAFE_NO_PAD.encode(payload),
            general_purpose::URL_SAFE_NO_PAD.encode(signature)
        );
        Ok(Some(token))
    }

    fn mode(&self) -> &'static str {
        "hmac"
    }
}

/// Explicit, opt-in tokenless mode for development and testing. Never a
/// silent fallback: the factory only constructs this when the deployment
/// sets the flag, and it warns on every use.
pub struct UnauthenticatedTokens;

impl JoinTokenSigner for UnauthenticatedTokens {
    fn sign(
        &self,
        session_id: &SessionId,
        _participant_name: &str,
        _role: ParticipantRole,
    ) -> Result<Option<String>, VideoServiceError> {
        warn!(
            "Issuing unauthenticated join for session {} (testing mode)",
            session_id
        );
        Ok(None)
    }

    fn mode(&self) -> &'static str {
        "unauthenticated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionId {
        SessionId::new("class-1").unwrap()
    }

    #[test]
    fn jwt_signer_produces_three_part_token() {
        let signer = JwtTokenSigner::new("app", "secret-key");
        let token = signer
            .sign(&session(), "Sarah", ParticipantRole::Coach)
            .unwrap()
            .unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn hmac_signer_is_deterministic_per_payload() {
        let signer = HmacTokenSigner::new("app", "secret-key");
        let token = signer
            .sign(&session(), "Alex", ParticipantRole::Student)
            .unwrap()
            .unwrap();
        assert_eq!(token.split('.').count(), 2);

        let payload = token.split('.').next().unwrap();
        let decoded = general_purpose::URL_SAFE_NO_PAD.decode(payload).unwrap();
        let decoded = String::from_utf8(decoded).unwrap();
        assert!(decoded.starts_with("app:class-1:Alex:student:"));
    }

    #[test]
    fn unauthenticated_mode_issues_no_token() {
        let signer = UnauthenticatedTokens;
        assert_eq!(
            signer.sign(&session(), "Alex", ParticipantRole::Student).unwrap(),
            None
        );
        assert_eq!(signer.mode(), "unauthenticated");
    }
}
