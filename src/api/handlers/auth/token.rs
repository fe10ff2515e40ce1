//! HS256 signed credentials.
//!
//! A credential is `base64url(header).base64url(claims).base64url(signature)`
//! where the signature is HMAC-SHA256 over the first two segments. The same
//! process-wide secret signs and verifies; nothing about an issued credential is
//! stored, so validity is decided entirely from the signature and the clock.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 2 * 60 * 60;
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

const ALGORITHM: &str = "HS256";

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

impl TokenClass {
    #[must_use]
    pub const fn ttl_seconds(self) -> i64 {
        match self {
            Self::Access => ACCESS_TOKEN_TTL_SECONDS,
            Self::Refresh => REFRESH_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenClass,
    pub jti: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("invalid signing key")]
    Key,
    #[error("failed to encode token")]
    Encode(#[from] serde_json::Error),
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

/// Current wall-clock time in unix seconds.
#[must_use]
pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

/// Issues and decodes credentials with a single signing secret.
#[derive(Debug)]
pub struct TokenCodec {
    secret: SecretString,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::Key)
    }

    /// Issue a credential whose lifetime is fixed by its class.
    ///
    /// # Errors
    /// Returns an error if the header or claims cannot be encoded.
    pub fn issue(&self, subject: Uuid, class: TokenClass, now: i64) -> Result<String, TokenError> {
        self.issue_with_ttl(subject, class, class.ttl_seconds(), now)
    }

    /// Issue a credential that expires `ttl_seconds` after `now`.
    ///
    /// # Errors
    /// Returns an error if the header or claims cannot be encoded.
    pub fn issue_with_ttl(
        &self,
        subject: Uuid,
        class: TokenClass,
        ttl_seconds: i64,
        now: i64,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            user_id: subject,
            iat: now,
            exp: now.saturating_add(ttl_seconds),
            token_type: class,
            jti: Uuid::new_v4().to_string(),
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Decode a credential and return its claims.
    ///
    /// The signature is verified before the expiry is looked at, so a
    /// correctly signed credential past its expiry always yields `Expired`.
    ///
    /// # Errors
    /// - `Malformed` if the token does not parse, is not HS256, or the signature does not verify.
    /// - `Expired` if `now` is past the embedded expiry.
    pub fn decode(&self, token: &str, now: i64) -> Result<TokenClaims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let claims_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let sig_b64 = parts.next().ok_or(TokenError::Malformed)?;
        if parts.next().is_some() {
            return Err(TokenError::Malformed);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed);
        }

        let signature =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(format!("{header_b64}.{claims_b64}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::Malformed)?;

        let claims: TokenClaims = b64d_json(claims_b64)?;
        if now > claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const NOW: i64 = 1_700_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new(SecretString::from(
            "test-signing-secret-with-32-bytes!".to_string(),
        ))
    }

    #[test]
    fn issue_then_decode_keeps_subject_and_class() -> Result<()> {
        let codec = codec();
        for class in [TokenClass::Access, TokenClass::Refresh] {
            for _ in 0..8 {
                let subject = Uuid::new_v4();
                let token = codec.issue(subject, class, NOW)?;
                let claims = codec.decode(&token, NOW)?;
                assert_eq!(claims.user_id, subject);
                assert_eq!(claims.token_type, class);
                assert_eq!(claims.iat, NOW);
                assert_eq!(claims.exp, NOW + class.ttl_seconds());
            }
        }
        Ok(())
    }

    #[test]
    fn ttl_is_fixed_by_class() {
        assert_eq!(TokenClass::Access.ttl_seconds(), 7200);
        assert_eq!(TokenClass::Refresh.ttl_seconds(), 604_800);
    }

    #[test]
    fn expired_token_always_reports_expired() -> Result<()> {
        let codec = codec();
        for ttl in [0_i64, 1, 60, ACCESS_TOKEN_TTL_SECONDS] {
            let token = codec.issue_with_ttl(Uuid::new_v4(), TokenClass::Access, ttl, NOW)?;
            for after in [1_i64, 2, 3600, 10 * REFRESH_TOKEN_TTL_SECONDS] {
                let result = codec.decode(&token, NOW + ttl + after);
                assert!(matches!(result, Err(TokenError::Expired)), "ttl={ttl} after={after}");
            }
        }
        Ok(())
    }

    #[test]
    fn token_is_valid_at_exact_expiry() -> Result<()> {
        let codec = codec();
        let token = codec.issue_with_ttl(Uuid::new_v4(), TokenClass::Refresh, 60, NOW)?;
        assert!(codec.decode(&token, NOW + 60).is_ok());
        Ok(())
    }

    #[test]
    fn wrong_secret_is_malformed_even_when_expired() -> Result<()> {
        let token = codec().issue_with_ttl(Uuid::new_v4(), TokenClass::Access, 1, NOW)?;
        let other = TokenCodec::new(SecretString::from(
            "another-signing-secret-32-bytes!!".to_string(),
        ));
        assert!(matches!(
            other.decode(&token, NOW + 3600),
            Err(TokenError::Malformed)
        ));
        Ok(())
    }

    #[test]
    fn tampered_claims_are_malformed() -> Result<()> {
        let codec = codec();
        let token = codec.issue(Uuid::new_v4(), TokenClass::Refresh, NOW)?;
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = TokenClaims {
            user_id: Uuid::new_v4(),
            iat: NOW,
            exp: NOW + 60,
            token_type: TokenClass::Access,
            jti: Uuid::new_v4().to_string(),
        };
        let forged = format!("{}.{}.{}", parts[0], b64e_json(&forged_claims)?, parts[2]);
        assert!(matches!(codec.decode(&forged, NOW), Err(TokenError::Malformed)));
        Ok(())
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = codec();
        for token in ["", "abc", "a.b", "a.b.c", "a.b.c.d", "....", "é.é.é"] {
            assert!(
                matches!(codec.decode(token, NOW), Err(TokenError::Malformed)),
                "token={token}"
            );
        }
    }

    #[test]
    fn non_hs256_header_is_malformed() -> Result<()> {
        let codec = codec();
        let token = codec.issue(Uuid::new_v4(), TokenClass::Access, NOW)?;
        let parts: Vec<&str> = token.split('.').collect();
        let header = TokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        };
        let forged = format!("{}.{}.{}", b64e_json(&header)?, parts[1], parts[2]);
        assert!(matches!(codec.decode(&forged, NOW), Err(TokenError::Malformed)));
        Ok(())
    }

    #[test]
    fn tokens_issued_in_the_same_second_differ() -> Result<()> {
        let codec = codec();
        let subject = Uuid::new_v4();
        let first = codec.issue(subject, TokenClass::Access, NOW)?;
        let second = codec.issue(subject, TokenClass::Access, NOW)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn claims_use_wire_names() -> Result<()> {
        let codec = codec();
        let subject = Uuid::new_v4();
        let token = codec.issue(subject, TokenClass::Refresh, NOW)?;
        let claims_b64 = token.split('.').nth(1).unwrap_or_default();
        let bytes = Base64UrlUnpadded::decode_vec(claims_b64)
            .map_err(|err| anyhow::anyhow!("invalid claims segment: {err}"))?;
        let raw: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(raw["user_id"], subject.to_string());
        assert_eq!(raw["token_type"], "refresh");
        assert_eq!(raw["iat"], NOW);
        assert!(raw["jti"].is_string());
        Ok(())
    }
}
