use std::sync::Arc;

use gatekey::{error::JwtVerifyError, jwt, JwtRef};
use gatekey_oauth2::{scope, Group, GroupPolicy, HasGroups, Policy, Scope};
use gatekey_tokens::{
    sources::oauth2::{dto::ClientCredentials, dto::TokenResponse, AuthorizationCodeExchange},
    AccessTokenRef, AuthorizationCodeRef, ClientId, ClientSecret,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CodeExchanger, IdentityClaims, Username, UsernameRef};

/// The name of the environment variable through which the access token
/// is propagated to spawned workloads
pub const UPSTREAM_TOKEN: &str = "UPSTREAM_TOKEN";

/// An error encountered while logging a user into the hub
#[derive(Debug, Error)]
pub enum LoginError<E> {
    /// The token endpoint refused or failed the code exchange
    #[error("failed to exchange authorization code for tokens")]
    ExchangeFailed(#[source] E),

    /// The access token returned by the token endpoint was not a
    /// decodable JWT
    #[error("access token could not be decoded")]
    InvalidAccessToken(#[source] JwtVerifyError),

    /// The token claims carry no usable user identifier
    #[error("token claims do not identify a user")]
    MissingUsername,

    /// The user belongs to none of the allowed groups
    #[error("user {0} is not authorized to use this hub")]
    NotInAllowedGroup(Username),
}

/// Configuration for a [`HubAuthenticator`]
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// The OAuth2 client ID registered for the hub
    pub client_id: ClientId,

    /// The client secret paired with the client ID
    pub client_secret: ClientSecret,

    /// The identity provider's authorize endpoint
    pub authorize_endpoint: Url,

    /// The identity provider's token endpoint
    pub token_endpoint: Url,

    /// The callback URL the provider redirects back to after login
    pub callback_url: Url,

    /// The scopes to request during login
    ///
    /// `openid` is always requested, whether or not it is listed here.
    pub scopes: Scope,

    /// Groups whose members may use the hub
    ///
    /// An empty list imposes no group restriction.
    pub allowed_groups: Vec<Group>,
}

/// Logs users into a hub through an OAuth2 authorization-code flow
///
/// The authenticator redirects the browser to the identity provider's
/// authorize endpoint, exchanges the code presented on the callback for
/// tokens, and admits the user if they belong to an allowed group. The
/// access token rides along in the admitted user's [`AuthState`] so it
/// can be handed to spawned workloads.
#[derive(Debug)]
pub struct HubAuthenticator<X = AuthorizationCodeExchange> {
    client_id: ClientId,
    authorize_endpoint: Url,
    callback_url: Url,
    scopes: Scope,
    extra_authorize_params: Vec<(String, String)>,
    group_policy: GroupPolicy,
    exchanger: X,
}

impl HubAuthenticator {
    /// Constructs an authenticator that performs real code exchanges
    /// against the configured token endpoint
    pub fn new(client: reqwest::Client, config: HubConfig) -> Self {
        let HubConfig {
            client_id,
            client_secret,
            authorize_endpoint,
            token_endpoint,
            callback_url,
            mut scopes,
            allowed_groups,
        } = config;

        // openid is required for the provider to issue identity claims
        scopes.extend(scope!["openid"]);

        let exchanger = AuthorizationCodeExchange::new(
            client,
            token_endpoint,
            Arc::new(ClientCredentials {
                client_id: client_id.clone(),
                client_secret,
            }),
            callback_url.as_str(),
        );

        let group_policy = GroupPolicy::any_of(allowed_groups);
        if group_policy.is_unrestricted() {
            tracing::info!("no allowed groups configured; any authenticated user will be admitted");
        }

        Self {
            client_id,
            authorize_endpoint,
            callback_url,
            scopes,
            extra_authorize_params: Vec::new(),
            group_policy,
            exchanger,
        }
    }
}

impl<X> HubAuthenticator<X> {
    /// Appends an extra query parameter to every authorize redirect
    ///
    /// Deployments use this to pin provider-specific behavior, such as a
    /// `kc_idp_hint` selecting an upstream identity provider.
    pub fn with_authorize_param(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.extra_authorize_params
            .push((name.into(), value.into()));
        self
    }

    /// Replaces the exchanger used to reach the token endpoint
    pub fn with_exchanger<Y>(self, exchanger: Y) -> HubAuthenticator<Y> {
        HubAuthenticator {
            client_id: self.client_id,
            authorize_endpoint: self.authorize_endpoint,
            callback_url: self.callback_url,
            scopes: self.scopes,
            extra_authorize_params: self.extra_authorize_params,
            group_policy: self.group_policy,
            exchanger,
        }
    }

    /// The URL to redirect the browser to in order to begin a login
    ///
    /// The `state` value is round-tripped through the provider and must
    /// be checked on the callback.
    pub fn authorize_url(&self, state: &str) -> Url {
        let scopes = self
            .scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let mut url = self.authorize_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", self.client_id.as_str());
            query.append_pair("redirect_uri", self.callback_url.as_str());
            query.append_pair("scope", &scopes);
            query.append_pair("state", state);
            for (name, value) in &self.extra_authorize_params {
                query.append_pair(name, value);
            }
        }
        url
    }
}

impl<X: CodeExchanger> HubAuthenticator<X> {
    /// Completes a login from the authorization code presented on the
    /// callback
    ///
    /// The code is exchanged for tokens, the returned access token is
    /// decoded without signature verification (it was received directly
    /// from the issuing authority over an authenticated channel), and
    /// the bearer is admitted if their groups satisfy the configured
    /// policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails, the access token cannot
    /// be decoded, the claims carry no usable identity, or the user
    /// belongs to none of the allowed groups.
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(
        &self,
        code: &AuthorizationCodeRef,
    ) -> Result<AuthenticatedUser, LoginError<X::Error>> {
        tracing::debug!("exchanging authorization code");

        let token_response = self.exchanger.exchange_code(code).await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::error!(error, "authorization code exchange failed");
            LoginError::ExchangeFailed(err)
        })?;

        let token = JwtRef::from_str(token_response.access_token.as_str());
        let user: IdentityClaims = token
            .decompose::<jwt::Header>()
            .and_then(|decomposed| decomposed.untrusted_claims())
            .map_err(|err| {
                let error: &dyn std::error::Error = &err;
                tracing::error!(error, "access token from the token endpoint is not decodable");
                LoginError::InvalidAccessToken(err)
            })?;

        let username = match user.username() {
            Some(name) => name.to_owned(),
            None => {
                tracing::error!("token claims carry no usable user identifier");
                return Err(LoginError::MissingUsername);
            }
        };

        if self.group_policy.evaluate(user.groups()).is_err() {
            tracing::warn!(%username, "user does not belong to any allowed group");
            return Err(LoginError::NotInAllowedGroup(username));
        }

        tracing::info!(%username, "user admitted");

        Ok(AuthenticatedUser {
            name: username,
            auth_state: AuthState {
                token_response,
                user,
            },
        })
    }
}

/// A user admitted by the authenticator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    name: Username,
    auth_state: AuthState,
}

impl AuthenticatedUser {
    /// The name the hub should register for the user
    pub fn name(&self) -> &UsernameRef {
        &self.name
    }

    /// The authentication state retained for the user
    pub fn auth_state(&self) -> &AuthState {
        &self.auth_state
    }

    /// Splits the user into its name and authentication state
    pub fn into_parts(self) -> (Username, AuthState) {
        (self.name, self.auth_state)
    }
}

/// State retained for an admitted user
///
/// Serializes cleanly so a hub can persist it alongside the user record
/// and recover it at spawn time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthState {
    token_response: TokenResponse,
    user: IdentityClaims,
}

impl AuthState {
    /// The access token issued at login
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.token_response.access_token
    }

    /// The full response received from the token endpoint
    pub fn token_response(&self) -> &TokenResponse {
        &self.token_response
    }

    /// The identity claims decoded from the access token
    pub fn user(&self) -> &IdentityClaims {
        &self.user
    }

    /// Environment entries to inject into a spawned workload
    ///
    /// [`UPSTREAM_TOKEN`] carries the raw access token so calls made
    /// from inside the workload can reach upstream services as the user.
    pub fn spawn_environment(&self) -> Vec<(String, String)> {
        vec![(
            UPSTREAM_TOKEN.to_owned(),
            self.token_response.access_token.as_str().to_owned(),
        )]
    }
}

#[cfg(test)]
mod tests {
    use aliri_base64::Base64Url;
    use aliri_clock::DurationSecs;
    use async_trait::async_trait;
    use gatekey::{jwa, jwk, Jwk};
    use gatekey_tokens::AccessToken;

    use super::*;

    #[derive(serde::Serialize)]
    struct Payload<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        preferred_username: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sub: Option<&'a str>,
        groups: &'a [&'a str],
    }

    impl<'a> Payload<'a> {
        fn named(preferred_username: &'a str, groups: &'a [&'a str]) -> Self {
            Self {
                preferred_username: Some(preferred_username),
                email: None,
                sub: None,
                groups,
            }
        }
    }

    fn signing_key() -> Jwk {
        Jwk::from(jwa::Hmac::new(Base64Url::from_raw(b"hub secret".to_vec())))
            .with_algorithm(jwa::Algorithm::HS256)
            .with_key_id(jwk::KeyId::from_static("hub"))
    }

    fn access_token(payload: &Payload<'_>) -> AccessToken {
        let jwt = gatekey::Jwt::try_from_parts_with_signature(
            &jwt::Header::with_key_id(jwa::Algorithm::HS256, jwk::KeyId::from_static("hub")),
            payload,
            &signing_key(),
        )
        .expect("token should sign");

        AccessToken::from(jwt.as_str())
    }

    fn token_response(access_token: AccessToken) -> TokenResponse {
        TokenResponse {
            access_token,
            id_token: None,
            refresh_token: None,
            expires_in: DurationSecs(300),
            token_type: Some("Bearer".to_owned()),
        }
    }

    #[derive(Debug)]
    struct StubExchanger {
        response: Option<TokenResponse>,
    }

    #[derive(Debug, Error)]
    #[error("stub exchange refused")]
    struct StubError;

    #[async_trait]
    impl CodeExchanger for StubExchanger {
        type Error = StubError;

        async fn exchange_code(
            &self,
            _: &AuthorizationCodeRef,
        ) -> Result<TokenResponse, StubError> {
            self.response.clone().ok_or(StubError)
        }
    }

    fn authenticator(allowed: &[&str]) -> HubAuthenticator {
        HubAuthenticator::new(
            reqwest::Client::new(),
            HubConfig {
                client_id: ClientId::from_static("hub-client"),
                client_secret: ClientSecret::from_static("hub-secret"),
                authorize_endpoint: "https://idp.example.com/authorize".parse().unwrap(),
                token_endpoint: "https://idp.example.com/token".parse().unwrap(),
                callback_url: "http://localhost:8000/hub/oauth_callback".parse().unwrap(),
                scopes: scope!["email", "profile"],
                allowed_groups: allowed.iter().copied().map(Group::from).collect(),
            },
        )
    }

    fn code() -> &'static AuthorizationCodeRef {
        AuthorizationCodeRef::from_str("one-time-code")
    }

    #[tokio::test]
    async fn admitted_user_carries_the_access_token() {
        let token = access_token(&Payload::named("jdoe", &["HubEditor", "Staff"]));
        let auth = authenticator(&["HubAdmin", "HubEditor"]).with_exchanger(StubExchanger {
            response: Some(token_response(token.clone())),
        });

        let user = auth.authenticate(code()).await.expect("login should pass");

        assert_eq!(user.name().as_str(), "jdoe");
        assert_eq!(user.auth_state().access_token().as_str(), token.as_str());

        let env = user.auth_state().spawn_environment();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].0, UPSTREAM_TOKEN);
        assert_eq!(env[0].1, token.as_str());
    }

    #[tokio::test]
    async fn failed_exchange_fails_the_login() {
        let auth = authenticator(&["HubAdmin"]).with_exchanger(StubExchanger { response: None });

        let err = auth.authenticate(code()).await.unwrap_err();
        assert!(matches!(err, LoginError::ExchangeFailed(_)));
    }

    #[tokio::test]
    async fn user_outside_the_allowed_groups_is_refused() {
        let token = access_token(&Payload::named("jdoe", &["Staff"]));
        let auth = authenticator(&["HubAdmin", "HubEditor"]).with_exchanger(StubExchanger {
            response: Some(token_response(token)),
        });

        let err = auth.authenticate(code()).await.unwrap_err();
        assert!(
            matches!(err, LoginError::NotInAllowedGroup(name) if name.as_str() == "jdoe"),
        );
    }

    #[tokio::test]
    async fn empty_allow_list_admits_any_authenticated_user() {
        let token = access_token(&Payload::named("jdoe", &[]));
        let auth = authenticator(&[]).with_exchanger(StubExchanger {
            response: Some(token_response(token)),
        });

        assert!(auth.authenticate(code()).await.is_ok());
    }

    #[tokio::test]
    async fn username_falls_back_to_the_email_claim() {
        let token = access_token(&Payload {
            preferred_username: None,
            email: Some("jdoe@example.com"),
            sub: Some("u-123"),
            groups: &["HubAdmin"],
        });
        let auth = authenticator(&["HubAdmin"]).with_exchanger(StubExchanger {
            response: Some(token_response(token)),
        });

        let user = auth.authenticate(code()).await.expect("login should pass");
        assert_eq!(user.name().as_str(), "jdoe@example.com");
    }

    #[tokio::test]
    async fn anonymous_token_fails_the_login() {
        let token = access_token(&Payload {
            preferred_username: None,
            email: None,
            sub: None,
            groups: &["HubAdmin"],
        });
        let auth = authenticator(&["HubAdmin"]).with_exchanger(StubExchanger {
            response: Some(token_response(token)),
        });

        let err = auth.authenticate(code()).await.unwrap_err();
        assert!(matches!(err, LoginError::MissingUsername));
    }

    #[tokio::test]
    async fn undecodable_access_token_fails_the_login() {
        let auth = authenticator(&["HubAdmin"]).with_exchanger(StubExchanger {
            response: Some(token_response(AccessToken::from_static("opaque-token"))),
        });

        let err = auth.authenticate(code()).await.unwrap_err();
        assert!(matches!(err, LoginError::InvalidAccessToken(_)));
    }

    #[test]
    fn authorize_url_carries_the_login_parameters() {
        let auth = authenticator(&[]).with_authorize_param("kc_idp_hint", "oidc");
        let url = auth.authorize_url("state-123");

        assert!(url.as_str().starts_with("https://idp.example.com/authorize?"));

        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(
            query.get("client_id").map(String::as_str),
            Some("hub-client")
        );
        assert_eq!(
            query.get("redirect_uri").map(String::as_str),
            Some("http://localhost:8000/hub/oauth_callback")
        );
        assert_eq!(query.get("state").map(String::as_str), Some("state-123"));
        assert_eq!(query.get("kc_idp_hint").map(String::as_str), Some("oidc"));
    }

    #[test]
    fn openid_is_always_among_the_requested_scopes() {
        let url = authenticator(&[]).authorize_url("state");

        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        let requested: Vec<_> = query.get("scope").unwrap().split(' ').collect();

        assert!(requested.contains(&"openid"));
        assert!(requested.contains(&"email"));
        assert!(requested.contains(&"profile"));
    }

    #[test]
    fn auth_state_round_trips_through_serde() {
        let token = access_token(&Payload::named("jdoe", &["HubAdmin"]));
        let state = AuthState {
            token_response: token_response(token.clone()),
            user: serde_json::from_str(r#"{"preferred_username": "jdoe"}"#).unwrap(),
        };

        let json = serde_json::to_string(&state).unwrap();
        let restored: AuthState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.access_token().as_str(), token.as_str());
        assert_eq!(restored.user().preferred_username(), Some("jdoe"));
    }
}
