//! The seam between the authenticator and the token endpoint

use async_trait::async_trait;
use gatekey_tokens::{
    sources::oauth2::{dto::TokenResponse, AuthorizationCodeExchange, TokenRequestError},
    AuthorizationCodeRef,
};

/// An exchanger of one-time authorization codes for token responses
///
/// [`AuthorizationCodeExchange`] implements this trait against a real
/// token endpoint; tests substitute implementations of their own.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    /// The error produced when an exchange fails
    type Error: std::error::Error + Send + Sync + 'static;

    /// Exchanges the authorization code for a token response
    async fn exchange_code(
        &self,
        code: &AuthorizationCodeRef,
    ) -> Result<TokenResponse, Self::Error>;
}

#[async_trait]
impl CodeExchanger for AuthorizationCodeExchange {
    type Error = TokenRequestError;

    async fn exchange_code(
        &self,
        code: &AuthorizationCodeRef,
    ) -> Result<TokenResponse, Self::Error> {
        self.exchange(code).await
    }
}
