//! JWT authorization based on OAuth2 access grants
//!
//! Access decisions are expressed as [policies](Policy): scope policies
//! grant access when a token's scope grant covers at least one accepted
//! alternative, and group policies admit a bearer who belongs to any one
//! allowed group. Tokens are authenticated by an [`Authority`] backed by
//! a local or remote JSON Web Key Set.
//!
//! OAuth2 scope semantics follow
//! [RFC 6749](https://datatracker.ietf.org/doc/html/rfc6749).
//!
//! # Feature flags
//!
//! The `reqwest` feature enables fetching and refreshing a remote JWKS,
//! but does not select a TLS backend for `reqwest` itself. If this crate
//! is your only consumer of `reqwest`, enable the `default-tls` or
//! `rustls-tls` feature to be able to reach an HTTPS endpoint.

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

mod authority;
pub mod group;
pub mod oidc;
pub mod policy;
pub mod scope;

pub use authority::{Authority, AuthorityError};
pub use group::{Group, GroupPolicy, Groups, HasGroups, NotInAllowedGroup};
pub use policy::{InsufficientScope, Policy, ScopePolicy};
pub use scope::{ClaimsWithScope, HasScope, InvalidScopeToken, Scope, ScopeToken};
