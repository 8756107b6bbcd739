//! Acquisition and background renewal of OAuth2 access tokens
//!
//! Two acquisition flows are provided. The [authorization-code
//! exchange][sources::oauth2::AuthorizationCodeExchange] turns a
//! one-time authorization code into a token response, authenticating the
//! client to the token endpoint with HTTP Basic credentials. The
//! [refresh-token source][sources::oauth2::RefreshTokenSource] renews an
//! existing grant, feeding rotated refresh tokens back into the
//! credential state.
//!
//! Tokens obtained through a renewable source carry lifetime metadata:
//! a token becomes _stale_ once a configurable fraction of its lifetime
//! has passed, well before it expires. A [`TokenWatcher`] renews the
//! token in the background as it goes stale, jittering the renewal time
//! so that a fleet of instances does not stampede the authority, and
//! backing off exponentially when the authority reports errors.
//! Consumers borrow the current token from the watcher and are hardly
//! aware renewals are happening at all.
//!
//! ```no_run
//! use aliri_clock::DurationSecs;
//! use gatekey_tokens::{
//!     backoff, jitter, sources, ClientId, ClientSecret, RefreshToken,
//!     TokenLifetimeConfig, TokenWatcher,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = sources::oauth2::dto::ClientCredentials {
//!     client_id: ClientId::from_static("my-client"),
//!     client_secret: ClientSecret::from_static("my-secret"),
//! };
//!
//! let source = sources::oauth2::RefreshTokenSource::new(
//!     reqwest::Client::new(),
//!     "https://idp.example.com/token".parse()?,
//!     credentials.into(),
//!     RefreshToken::from_static("initial-refresh-token").into_boxed_ref(),
//!     TokenLifetimeConfig::default(),
//! );
//!
//! let watcher = TokenWatcher::spawn_from_token_source(
//!     source,
//!     jitter::RandomEarlyJitter::new(DurationSecs(60)),
//!     backoff::ErrorBackoffConfig::default(),
//! )
//! .await?;
//!
//! tracing::info!(
//!     token = format_args!("{:#?}", watcher.token().access_token()),
//!     "first access token"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! * `oauth2` (default): the token-endpoint exchange and refresh sources.
//! * `rand` (default): the random early [jitter source][jitter].

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod backoff;
pub mod jitter;
pub mod sources;
mod strings;
mod tokens;
mod watcher;

pub use strings::*;
pub use tokens::{TokenLifetimeConfig, TokenStatus, TokenWithLifetime};
pub use watcher::{BorrowedToken, TokenPublisherQuit, TokenWatcher};
