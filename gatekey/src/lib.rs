//! Token validation against JSON Web Key Sets.
//!
//! This crate implements the subset of the Javascript/JSON Object Signing and
//! Encryption (JOSE) standards needed to accept bearer tokens issued by an
//! external identity provider:
//!
//! * JSON Web Signature (JWS): [RFC7515][]
//! * JSON Web Key (JWK): [RFC7517][]
//! * JSON Web Algorithms (JWA): [RFC7518][]
//! * JSON Web Token (JWT): [RFC7519][]
//!
//! Verification covers RSA (`RS*`/`PS*`) keys as published in a JWKS and
//! symmetric HMAC (`HS*`) secrets. HMAC keys can also produce signatures,
//! which keeps tests and demos independent of a live issuer.
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515
//! [RFC7517]: https://tools.ietf.org/html/rfc7517
//! [RFC7518]: https://tools.ietf.org/html/rfc7518
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```
//! use aliri_base64::Base64UrlRef;
//! use gatekey::jwt::{HasAlgorithm, TokenHeader};
//! use gatekey::{jwa, jwk, jwt, Jwk, Jwks};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key = Jwk::from(jwa::Hmac::new(Base64UrlRef::from_slice(b"my secret").to_owned()))
//!     .with_algorithm(jwa::Algorithm::HS256)
//!     .with_key_id(jwk::KeyId::from_static("primary"));
//!
//! let claims = jwt::Claims::new()
//!     .with_audience(jwt::Audience::from_static("my_api"))
//!     .with_issuer(jwt::Issuer::from_static("authority"))
//!     .with_future_expiration(300);
//!
//! let token = claims.sign(&key, &jwt::Header::with_key_id(
//!     jwa::Algorithm::HS256,
//!     jwk::KeyId::from_static("primary"),
//! ))?;
//!
//! let mut keys = Jwks::default();
//! keys.add_key(key);
//!
//! let validator = jwt::TokenValidator::default()
//!     .add_approved_algorithm(jwa::Algorithm::HS256)
//!     .add_allowed_audience(jwt::Audience::from_static("my_api"))
//!     .require_issuer(jwt::Issuer::from_static("authority"));
//!
//! let decomposed: jwt::Decomposed = token.decompose()?;
//! let key = keys
//!     .select_key(decomposed.kid(), decomposed.alg())
//!     .expect("signing key should be present");
//!
//! let validated: jwt::Validated = decomposed.verify(key, &validator)?;
//! # let _ = validated;
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

pub mod error;
pub mod jwa;
pub mod jwk;
mod jwks;
pub mod jws;
pub mod jwt;

#[doc(inline)]
pub use jwk::Jwk;
#[doc(inline)]
pub use jwks::Jwks;
#[doc(inline)]
pub use jwt::{Jwt, JwtRef};
