//! Tower middleware for protecting HTTP endpoints with `gatekey`
//! authorities and policies
//!
//! Three layers are provided through the [`Oauth2Authorizer`] builder:
//!
//! * the JWT layer authenticates the `Authorization` header against an
//!   [`Authority`][gatekey_oauth2::Authority] and stores the validated
//!   claims in the request extensions, answering `401 Unauthorized` when
//!   the token is missing, malformed, or invalid;
//! * the scope layer evaluates a
//!   [`ScopePolicy`][gatekey_oauth2::ScopePolicy] against those claims,
//!   answering `403 Forbidden` when the granted scope is insufficient;
//! * the group layer does the same for a
//!   [`GroupPolicy`][gatekey_oauth2::GroupPolicy].
//!
//! ```no_run
//! use std::net::SocketAddr;
//!
//! use axum::{routing::{get, post}, Router};
//! use gatekey::jwt;
//! use gatekey_oauth2::{scope, Authority, ScopePolicy};
//! use gatekey_tower::Oauth2Authorizer;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = jwt::TokenValidator::default()
//!     .add_approved_algorithm(gatekey::jwa::Algorithm::RS256)
//!     .add_allowed_audience(jwt::Audience::from_static("account"));
//!
//! let authority = Authority::from_remote(
//!     "https://idp.example.com/realms/main/protocol/openid-connect/certs".into(),
//!     validator,
//! )
//! .await?;
//! authority.spawn_refresh(std::time::Duration::from_secs(600));
//!
//! let authorizer = Oauth2Authorizer::new().with_terse_error_handler();
//!
//! let router = Router::new()
//!     .route(
//!         "/docs",
//!         get(read_doc).layer(
//!             authorizer.scope_layer(ScopePolicy::allow_one(scope!["example:doc:read"])),
//!         ),
//!     )
//!     .route(
//!         "/docs/new",
//!         post(create_doc).layer(
//!             authorizer.scope_layer(ScopePolicy::allow_one(scope!["example:doc:create"])),
//!         ),
//!     )
//!     .layer(authorizer.jwt_layer(authority));
//!
//! async fn read_doc() {}
//! async fn create_doc() {}
//!
//! let listener = tokio::net::TcpListener::bind(&SocketAddr::new([0, 0, 0, 0].into(), 3000))
//!     .await?;
//! axum::serve(listener, router).await?;
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

use std::fmt;
use std::marker::PhantomData;

mod authorizer;
mod jwt;
mod oauth2;
pub mod util;

pub use crate::authorizer::Oauth2Authorizer;
pub use crate::jwt::OnJwtError;
pub use crate::oauth2::{OnGroupError, OnScopeError};

/// Error responder producing the relevant status code with an empty body
pub struct TerseErrorHandler<ResBody> {
    _ty: PhantomData<fn() -> ResBody>,
}

impl<ResBody> TerseErrorHandler<ResBody> {
    /// Instantiates a new instance over a given body type
    #[inline]
    pub fn new() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> fmt::Debug for TerseErrorHandler<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("TerseErrorHandler")
    }
}

impl<ResBody> Default for TerseErrorHandler<ResBody> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<ResBody> Clone for TerseErrorHandler<ResBody> {
    #[inline]
    fn clone(&self) -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> Copy for TerseErrorHandler<ResBody> {}

/// Error responder producing the relevant status code along with a
/// description of the failure in the `www-authenticate` challenge
pub struct VerboseErrorHandler<ResBody> {
    _ty: PhantomData<fn() -> ResBody>,
}

impl<ResBody> VerboseErrorHandler<ResBody> {
    /// Instantiates a new instance over a given body type
    #[inline]
    pub fn new() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> fmt::Debug for VerboseErrorHandler<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("VerboseErrorHandler")
    }
}

impl<ResBody> Default for VerboseErrorHandler<ResBody> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<ResBody> Clone for VerboseErrorHandler<ResBody> {
    #[inline]
    fn clone(&self) -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> Copy for VerboseErrorHandler<ResBody> {}
