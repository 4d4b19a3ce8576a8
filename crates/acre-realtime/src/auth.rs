//! Bearer-token verification for the realtime channel.
//!
//! Tokens are HS256 JWTs carrying the user id in `sub`. Issuer, audience,
//! expiry, and signature are all checked with zero clock leeway before a
//! connection is accepted.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use acre_core::ids::UserId;

#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("token rejected: {0}")]
    InvalidToken(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    aud: String,
    exp: i64,
}

pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
}

impl TokenVerifier {
    pub fn new(settings: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
        }
    }

    /// Verify a token and extract the user id from `sub`.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(UserId::from_raw(data.claims.sub))
    }

    /// Mint a token for a user. The auth endpoints that hand these out live
    /// outside this crate; tests use this to exercise the verify path.
    pub fn issue(&self, user_id: &UserId, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id.as_str().to_owned(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: Utc::now().timestamp() + ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> JwtSettings {
        JwtSettings {
            secret: "test-secret".into(),
            issuer: "acre".into(),
            audience: "acre-client".into(),
        }
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let verifier = TokenVerifier::new(&settings());
        let user = UserId::from_raw("user_ada");
        let token = verifier.issue(&user, Duration::from_secs(3600)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), user);
    }

    #[test]
    fn empty_token_is_missing() {
        let verifier = TokenVerifier::new(&settings());
        assert!(matches!(verifier.verify(""), Err(AuthError::MissingToken)));
    }

    #[test]
    fn garbage_token_rejected() {
        let verifier = TokenVerifier::new(&settings());
        assert!(matches!(
            verifier.verify("not.a.jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let verifier = TokenVerifier::new(&settings());
        let claims = Claims {
            sub: "user_ada".into(),
            iss: "acre".into(),
            aud: "acre-client".into(),
            exp: Utc::now().timestamp() - 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn wrong_issuer_rejected() {
        let mut other = settings();
        other.issuer = "someone-else".into();
        let minted = TokenVerifier::new(&other)
            .issue(&UserId::from_raw("user_ada"), Duration::from_secs(3600))
            .unwrap();

        let verifier = TokenVerifier::new(&settings());
        assert!(verifier.verify(&minted).is_err());
    }

    #[test]
    fn wrong_audience_rejected() {
        let mut other = settings();
        other.audience = "other-app".into();
        let minted = TokenVerifier::new(&other)
            .issue(&UserId::from_raw("user_ada"), Duration::from_secs(3600))
            .unwrap();

        let verifier = TokenVerifier::new(&settings());
        assert!(verifier.verify(&minted).is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let mut other = settings();
        other.secret = "different-secret".into();
        let minted = TokenVerifier::new(&other)
            .issue(&UserId::from_raw("user_ada"), Duration::from_secs(3600))
            .unwrap();

        let verifier = TokenVerifier::new(&settings());
        assert!(verifier.verify(&minted).is_err());
    }
}
