use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Credentials;

/// Tokens are treated as expired this long before the cloud would reject them.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 3600;

#[derive(Serialize)]
pub struct SignInRequest<'a> {
    pub user: SignInUser<'a>,
}

#[derive(Serialize)]
pub struct SignInUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub application: Application<'a>,
}

#[derive(Serialize)]
pub struct Application<'a> {
    pub app_id: &'a str,
    pub app_secret: &'a str,
}

impl<'a> From<&'a Credentials> for SignInRequest<'a> {
    fn from(credentials: &'a Credentials) -> Self {
        Self {
            user: SignInUser {
                email: &credentials.email,
                password: &credentials.password,
                application: Application {
                    app_id: &credentials.app_id,
                    app_secret: &credentials.app_secret,
                },
            },
        }
    }
}

#[derive(Serialize)]
pub struct RefreshTokenRequest<'a> {
    pub user: RefreshTokenUser<'a>,
}

#[derive(Serialize)]
pub struct RefreshTokenUser<'a> {
    pub refresh_token: &'a str,
}

impl<'a> RefreshTokenRequest<'a> {
    pub fn new(refresh_token: &'a str) -> Self {
        Self {
            user: RefreshTokenUser { refresh_token },
        }
    }
}

/// Body of a successful sign-in or refresh.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub role_tags: Option<Vec<serde_json::Value>>,
}

/// An activated token. The expiry is fixed when the token is created and the
/// whole value is swapped out on refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub role: String,
    pub role_tags: Vec<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Fails when `expires_in` does not yield a representable expiry.
    pub fn activate(response: TokenResponse, now: DateTime<Utc>) -> Result<Self> {
        let expires_at = Duration::try_seconds(response.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::InvalidToken(format!("expires_in out of range: {}", response.expires_in))
            })?;

        Ok(Self {
            expires_at,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
            role: response.role.unwrap_or_default(),
            role_tags: response.role_tags.unwrap_or_default(),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_response(expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: "orig_token".to_string(),
            refresh_token: "orig_refresh_token".to_string(),
            expires_in,
            role: Some("EndUser".to_string()),
            role_tags: Some(vec![]),
        }
    }

    #[test]
    fn test_sign_in_request_serialization() {
        let credentials = Credentials::new("test@example.com", "password123", "app-secret");
        let json = serde_json::to_value(SignInRequest::from(&credentials)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "user": {
                    "email": "test@example.com",
                    "password": "password123",
                    "application": {
                        "app_id": "Ob-Ng-id",
                        "app_secret": "app-secret"
                    }
                }
            })
        );
    }

    #[test]
    fn test_refresh_request_serialization() {
        let json = serde_json::to_string(&RefreshTokenRequest::new("refresh456")).unwrap();
        assert_eq!(json, r#"{"user":{"refresh_token":"refresh456"}}"#);
    }

    #[test]
    fn test_token_response_parsing() {
        let json = r#"{"access_token":"access123","refresh_token":"refresh456","expires_in":86400,"role":"EndUser","role_tags":[]}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.access_token, "access123");
        assert_eq!(response.refresh_token, "refresh456");
        assert_eq!(response.expires_in, 86400);
        assert_eq!(response.role.as_deref(), Some("EndUser"));
        assert_eq!(response.role_tags, Some(vec![]));
    }

    #[test]
    fn test_token_response_with_null_role() {
        let json = r#"{"access_token":"access123","refresh_token":"refresh456","expires_in":86400,"role":null,"role_tags":null}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();

        let token = AccessToken::activate(response, Utc::now()).unwrap();
        assert_eq!(token.role, "");
        assert!(token.role_tags.is_empty());
    }

    #[test]
    fn test_activate_rejects_out_of_range_lifetime() {
        let result = AccessToken::activate(token_response(i64::MAX), Utc::now());
        assert!(matches!(result, Err(Error::InvalidToken(_))));

        let result = AccessToken::activate(token_response(i64::MAX / 1000), Utc::now());
        assert!(matches!(result, Err(Error::InvalidToken(_))));
    }

    #[test]
    fn test_activate_sets_expiry() {
        let now = Utc::now();
        let token = AccessToken::activate(token_response(10), now).unwrap();
        assert_eq!(token.expires_at, now + Duration::seconds(10));
    }

    #[test]
    fn test_token_expiration_margin() {
        let now = Utc::now();
        let token = AccessToken::activate(token_response(3600), now).unwrap();

        // A one hour token is already inside the margin.
        assert!(token.is_expired(now));
        assert!(!token.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn test_long_lived_token_not_expired() {
        let now = Utc::now();
        let token = AccessToken::activate(token_response(86400), now).unwrap();

        assert!(!token.is_expired(now));
        assert!(!token.is_expired(now + Duration::hours(22)));
        assert!(token.is_expired(now + Duration::hours(23)));
    }
}
