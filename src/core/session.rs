//! API session - bearer tokens and their expiry
//!
//! The token is never verified locally; only the `exp` claim of the JWT
//! payload is decoded so an expired session is refused before a request goes
//! out.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable that supplies an access token directly
pub const TOKEN_ENV: &str = "MFT_TOKEN";

/// Bearer credentials for the ERP API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Claims read from the JWT payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch
    #[serde(default)]
    pub exp: Option<i64>,

    #[serde(default)]
    pub user_id: Option<serde_json::Value>,

    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("access token is not a JWT: {0}")]
    #[diagnostic(code(mft::session::malformed))]
    Malformed(String),

    #[error("session expired at {expired_at}")]
    #[diagnostic(
        code(mft::session::expired),
        help("Obtain a new access token and run `mft session set <TOKEN>`")
    )]
    Expired { expired_at: DateTime<Utc> },

    #[error("no session found")]
    #[diagnostic(
        code(mft::session::missing),
        help("Run `mft session set <TOKEN>` or set MFT_TOKEN")
    )]
    Missing,

    #[error("failed to read or write session file: {0}")]
    #[diagnostic(code(mft::session::io))]
    Io(String),
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into().trim().to_string(),
            refresh_token: None,
        }
    }

    /// Decode the (unverified) JWT payload
    pub fn claims(&self) -> Result<Claims, SessionError> {
        let mut parts = self.access_token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(p), Some(_)) => p,
            _ => {
                return Err(SessionError::Malformed(
                    "expected three dot-separated segments".to_string(),
                ))
            }
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| SessionError::Malformed(format!("payload is not base64url: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::Malformed(format!("payload is not JSON: {}", e)))
    }

    /// Expiry time, or `None` for tokens without an `exp` claim
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>, SessionError> {
        Ok(self
            .claims()?
            .exp
            .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0)))
    }

    /// Fail when the token has expired at `now`
    pub fn ensure_valid_at(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        match self.expires_at()? {
            Some(expired_at) if expired_at <= now => Err(SessionError::Expired { expired_at }),
            _ => Ok(()),
        }
    }

    /// Session from `MFT_TOKEN`, else from the project session file
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                return Ok(Session::new(token));
            }
        }
        Self::read(path)
    }

    /// Session stored in a file
    pub fn read(path: &Path) -> Result<Self, SessionError> {
        if !path.exists() {
            return Err(SessionError::Missing);
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| SessionError::Io(e.to_string()))?;
        serde_yml::from_str(&content).map_err(|e| SessionError::Io(e.to_string()))
    }

    /// Write the session file, readable by the owner only
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let yaml = serde_yml::to_string(self).map_err(|e| SessionError::Io(e.to_string()))?;
        std::fs::write(path, yaml).map_err(|e| SessionError::Io(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| SessionError::Io(e.to_string()))?;
        }
        Ok(())
    }

    /// Remove the session file; a missing file is not an error
    pub fn clear(path: &Path) -> Result<bool, SessionError> {
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path).map_err(|e| SessionError::Io(e.to_string()))?;
        Ok(true)
    }
}

/// Build an unsigned JWT with the given payload (test helper)
#[cfg(test)]
pub(crate) fn fake_jwt(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_claims_decoding() {
        let token = fake_jwt(&json!({"exp": 1_700_000_000, "user_id": 7, "username": "qa"}));
        let claims = Session::new(token).claims().unwrap();
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.username.as_deref(), Some("qa"));
    }

    #[test]
    fn test_expiry_boundary() {
        let session = Session::new(fake_jwt(&json!({"exp": 1_700_000_000})));
        let exp = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();

        assert!(session.ensure_valid_at(exp - chrono::Duration::seconds(1)).is_ok());
        assert!(matches!(
            session.ensure_valid_at(exp),
            Err(SessionError::Expired { .. })
        ));
    }

    #[test]
    fn test_token_without_exp_never_expires() {
        let session = Session::new(fake_jwt(&json!({"user_id": 1})));
        assert_eq!(session.expires_at().unwrap(), None);
        assert!(session.ensure_valid_at(Utc::now()).is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(Session::new("opaque").claims(), Err(SessionError::Malformed(_))));
        assert!(matches!(Session::new("a.!!!.c").claims(), Err(SessionError::Malformed(_))));
        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("hello"));
        assert!(matches!(Session::new(not_json).claims(), Err(SessionError::Malformed(_))));
    }

    #[test]
    fn test_save_read_clear() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("session.yaml");
        let mut session = Session::new(fake_jwt(&json!({"exp": 1})));
        session.refresh_token = Some("refresh".to_string());

        session.save(&path).unwrap();
        assert_eq!(Session::read(&path).unwrap(), session);

        assert!(Session::clear(&path).unwrap());
        assert!(!Session::clear(&path).unwrap());
        assert!(matches!(Session::read(&path), Err(SessionError::Missing)));
    }
}
