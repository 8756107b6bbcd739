//! DTOs exchanged with OAuth2 token endpoints

use aliri_clock::DurationSecs;
use serde::{Deserialize, Serialize};

use crate::{AccessToken, AuthorizationCodeRef, ClientId, ClientSecret, IdToken, RefreshToken, RefreshTokenRef};

/// Client credentials presented to the token endpoint
///
/// The credentials are sent using HTTP Basic authentication rather than
/// in the request body.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// The client ID
    pub client_id: ClientId,

    /// The client secret
    pub client_secret: ClientSecret,
}

/// Form parameters for the authorization-code grant
#[derive(Debug, Serialize)]
pub(crate) struct AuthorizationCodeGrant<'a> {
    pub grant_type: &'static str,
    pub code: &'a AuthorizationCodeRef,
    pub redirect_uri: &'a str,
}

/// Form parameters for the refresh-token grant
#[derive(Debug, Serialize)]
pub(crate) struct RefreshTokenGrant<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a RefreshTokenRef,
}

/// A successful response from the token endpoint
///
/// A response without an `access_token` is not a successful response;
/// deserialization fails and the exchange reports an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The issued access token
    pub access_token: AccessToken,

    /// The ID token, when `openid` was among the requested scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<IdToken>,

    /// A refresh token usable to renew the grant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,

    /// The lifetime of the access token in seconds
    pub expires_in: DurationSecs,

    /// The token type, expected to be `Bearer`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_full_response() {
        let body = r#"{
            "access_token": "at-123",
            "id_token": "idt-456",
            "refresh_token": "rt-789",
            "expires_in": 300,
            "token_type": "Bearer",
            "not-before-policy": 0
        }"#;

        let resp: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.access_token.as_str(), "at-123");
        assert_eq!(resp.refresh_token.as_deref().map(|r| r.as_str()), Some("rt-789"));
        assert_eq!(resp.expires_in, DurationSecs(300));
    }

    #[test]
    fn response_without_access_token_is_an_error() {
        let body = r#"{"expires_in": 300}"#;
        assert!(serde_json::from_str::<TokenResponse>(body).is_err());
    }

    #[test]
    fn authorization_code_grant_encodes_as_form_fields() {
        let grant = AuthorizationCodeGrant {
            grant_type: "authorization_code",
            code: AuthorizationCodeRef::from_str("abc123"),
            redirect_uri: "http://localhost:8000/hub/oauth_callback",
        };

        let encoded = serde_urlencoded_like(&grant);
        assert!(encoded.contains("grant_type=authorization_code"));
        assert!(encoded.contains("code=abc123"));
    }

    fn serde_urlencoded_like<T: Serialize>(value: &T) -> String {
        let json = serde_json::to_value(value).unwrap();
        json.as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.as_str().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("&")
    }
}
