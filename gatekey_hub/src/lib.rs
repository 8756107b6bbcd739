//! OAuth2 authorization-code login for multi-user workload hubs
//!
//! A hub hosts interactive workloads on behalf of many users and needs
//! three things from its identity provider: a browser redirect that
//! starts a login, an exchange that turns the returned authorization
//! code into tokens, and a decision about whether the authenticated
//! user may use the hub at all. [`HubAuthenticator`] packages the three,
//! admitting users based on the `groups` claim carried by their access
//! token and retaining that token so it can be handed to the user's
//! spawned workload through the [`UPSTREAM_TOKEN`] environment variable.
//!
//! The access token received from the token endpoint is decoded without
//! signature verification. That is deliberate and narrowly scoped: the
//! token arrives directly from the issuing authority over an
//! authenticated channel, so there is no untrusted hop to defend
//! against. Tokens presented by API callers must instead be verified
//! against the provider's key set, which is the business of
//! `gatekey_oauth2`.
//!
//! ```no_run
//! use gatekey_hub::{HubAuthenticator, HubConfig};
//! use gatekey_oauth2::scope;
//! use gatekey_tokens::{AuthorizationCodeRef, ClientId, ClientSecret};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let authenticator = HubAuthenticator::new(
//!     reqwest::Client::new(),
//!     HubConfig {
//!         client_id: ClientId::from_static("hub-client"),
//!         client_secret: ClientSecret::from_static("hub-secret"),
//!         authorize_endpoint: "https://idp.example.com/authorize".parse()?,
//!         token_endpoint: "https://idp.example.com/token".parse()?,
//!         callback_url: "https://hub.example.com/hub/oauth_callback".parse()?,
//!         scopes: scope!["email", "profile"],
//!         allowed_groups: vec!["HubAdmin".into(), "HubEditor".into()],
//!     },
//! )
//! .with_authorize_param("kc_idp_hint", "oidc");
//!
//! let redirect = authenticator.authorize_url("per-login-state");
//! // …the browser completes the login and returns with a code…
//!
//! let user = authenticator
//!     .authenticate(AuthorizationCodeRef::from_str("code-from-callback"))
//!     .await?;
//!
//! tracing::info!(username = %user.name(), "starting workload");
//! let environment = user.auth_state().spawn_environment();
//! # let _ = (redirect, environment);
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod authenticator;
mod claims;
mod exchange;

pub use authenticator::{
    AuthState, AuthenticatedUser, HubAuthenticator, HubConfig, LoginError, UPSTREAM_TOKEN,
};
pub use claims::{IdentityClaims, Username, UsernameRef};
pub use exchange::CodeExchanger;
