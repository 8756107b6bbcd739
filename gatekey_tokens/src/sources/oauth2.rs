//! Token sources backed by an OAuth2 token endpoint
//!
//! Client credentials are presented to the token endpoint using HTTP
//! Basic authentication, with the grant parameters carried as
//! URL-encoded form data.

use std::sync::Arc;

use aliri_clock::Clock;
use async_trait::async_trait;
use thiserror::Error;

use super::AsyncTokenSource;
use crate::{AuthorizationCodeRef, RefreshTokenRef, TokenLifetimeConfig, TokenWithLifetime};

pub mod dto;

/// An error encountered while requesting a token from the authority
#[derive(Debug, Error)]
pub enum TokenRequestError {
    /// The authority rejected the request
    #[error("authority rejected token request: {body}")]
    ErrorWithBody {
        /// The underlying request error
        source: reqwest::Error,
        /// The authority's error body
        body: String,
    },

    /// The token body could not be deserialized
    #[error("error deserializing token body from authority")]
    TokenBodyError(#[from] serde_json::Error),

    /// The response body could not be read
    #[error("error reading response body")]
    BodyReadError(reqwest::Error),

    /// The request could not be sent to the authority
    #[error("error sending request to authority")]
    RequestSend(reqwest::Error),
}

#[tracing::instrument(
    err,
    skip_all,
    fields(
        token_url = %token_url,
        credentials.grant_type = grant_type,
        credentials.client_id = %credentials.client_id,
    ),
)]
async fn post_token_request<F: serde::Serialize>(
    client: &reqwest::Client,
    token_url: reqwest::Url,
    credentials: &dto::ClientCredentials,
    grant_type: &'static str,
    form: &F,
) -> Result<dto::TokenResponse, TokenRequestError> {
    tracing::trace!("requesting token from authority");

    let resp = client
        .post(token_url)
        .basic_auth(
            credentials.client_id.as_str(),
            Some(credentials.client_secret.as_str()),
        )
        .form(form)
        .send()
        .await
        .map_err(TokenRequestError::RequestSend)?;

    tracing::debug!(
        response.status = resp.status().as_u16(),
        "received token response from issuing authority"
    );

    if let Err(error) = resp.error_for_status_ref() {
        let body = resp.text().await.map_err(TokenRequestError::BodyReadError)?;
        return Err(TokenRequestError::ErrorWithBody {
            source: error,
            body,
        });
    }

    let body = resp
        .bytes()
        .await
        .map_err(TokenRequestError::BodyReadError)?;
    let resp: dto::TokenResponse = serde_json::from_slice(&body)?;

    tracing::info!(
        has_id_token = resp.id_token.is_some(),
        has_refresh_token = resp.refresh_token.is_some(),
        lifetime = resp.expires_in.0,
        "received new tokens"
    );

    Ok(resp)
}

/// A one-shot exchange of an authorization code for a token response
///
/// Authorization codes are single-use, so this exchange does not behave
/// as a renewable token source; the refresh token carried in its
/// response can seed a [`RefreshTokenSource`] when ongoing renewal is
/// needed.
#[derive(Debug, Clone)]
pub struct AuthorizationCodeExchange {
    client: reqwest::Client,
    token_url: reqwest::Url,
    credentials: Arc<dto::ClientCredentials>,
    redirect_uri: String,
}

impl AuthorizationCodeExchange {
    /// Constructs a new authorization-code exchange
    ///
    /// `redirect_uri` must match the redirect URI presented during the
    /// authorize redirect.
    pub fn new(
        client: reqwest::Client,
        token_url: reqwest::Url,
        credentials: Arc<dto::ClientCredentials>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url,
            credentials,
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Exchanges an authorization code for a token response
    ///
    /// # Errors
    ///
    /// Returns an error if the authority rejects the exchange or the
    /// response cannot be understood.
    pub async fn exchange(
        &self,
        code: &AuthorizationCodeRef,
    ) -> Result<dto::TokenResponse, TokenRequestError> {
        let grant = dto::AuthorizationCodeGrant {
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.redirect_uri,
        };

        post_token_request(
            &self.client,
            self.token_url.clone(),
            &self.credentials,
            "authorization_code",
            &grant,
        )
        .await
    }
}

/// A renewable token source using the refresh-token grant
///
/// If the authority rotates the refresh token, the rotated token
/// replaces the stored one for subsequent renewals.
#[derive(Debug)]
pub struct RefreshTokenSource<C = aliri_clock::System> {
    client: reqwest::Client,
    token_url: reqwest::Url,
    credentials: Arc<dto::ClientCredentials>,
    refresh_token: Box<RefreshTokenRef>,
    lifetime_config: TokenLifetimeConfig<C>,
}

impl<C> RefreshTokenSource<C> {
    /// Constructs a new refresh-token source
    pub fn new(
        client: reqwest::Client,
        token_url: reqwest::Url,
        credentials: Arc<dto::ClientCredentials>,
        refresh_token: Box<RefreshTokenRef>,
        lifetime_config: TokenLifetimeConfig<C>,
    ) -> Self {
        Self {
            client,
            token_url,
            credentials,
            refresh_token,
            lifetime_config,
        }
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> AsyncTokenSource for RefreshTokenSource<C> {
    type Error = TokenRequestError;

    async fn request_token(&mut self) -> Result<TokenWithLifetime, Self::Error> {
        let grant = dto::RefreshTokenGrant {
            grant_type: "refresh_token",
            refresh_token: &*self.refresh_token,
        };

        let resp = post_token_request(
            &self.client,
            self.token_url.clone(),
            &self.credentials,
            "refresh_token",
            &grant,
        )
        .await?;

        if let Some(rotated) = &resp.refresh_token {
            tracing::info!("received rotated refresh token");
            self.refresh_token = rotated.clone().into_boxed_ref();
        }

        let token = self.lifetime_config.create_token(
            &resp.access_token,
            resp.id_token.as_ref(),
            resp.expires_in,
        );

        Ok(token)
    }
}
