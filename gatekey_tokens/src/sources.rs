//! Token sources

use std::error;

use async_trait::async_trait;

use crate::TokenWithLifetime;

#[cfg(feature = "oauth2")]
pub mod oauth2;

/// An asynchronous source of renewable tokens
#[async_trait]
pub trait AsyncTokenSource: Send + Sync {
    /// The error type returned when retrieving a token fails
    type Error: error::Error + Send + Sync + 'static;

    /// Requests a token from the source
    async fn request_token(&mut self) -> Result<TokenWithLifetime, Self::Error>;
}
