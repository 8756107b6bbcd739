//! Errors produced while handling keys and tokens

use std::error::Error as StdError;

use thiserror::Error;

type Source = Box<dyn StdError + Send + Sync + 'static>;

/// The key cannot be used with the requested algorithm
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("key incompatible with algorithm '{alg}'")]
pub struct IncompatibleAlgorithm {
    alg: crate::jwa::Algorithm,
}

#[inline]
pub(crate) fn incompatible_algorithm(
    alg: impl Into<crate::jwa::Algorithm>,
) -> IncompatibleAlgorithm {
    IncompatibleAlgorithm { alg: alg.into() }
}

/// The provided name does not match any supported algorithm
#[derive(Debug, Error)]
#[error("'{alg}' does not match any supported algorithm")]
pub struct UnknownAlgorithm {
    alg: String,
}

#[inline]
pub(crate) fn unknown_algorithm(alg: String) -> UnknownAlgorithm {
    UnknownAlgorithm { alg }
}

/// The key material was rejected
#[derive(Debug, Error)]
#[error("key rejected: {reason}")]
pub struct KeyRejected {
    reason: &'static str,
}

pub(crate) const fn key_rejected(reason: &'static str) -> KeyRejected {
    KeyRejected { reason }
}

/// Unexpected error (possibly a bug)
#[derive(Debug, Error)]
#[error("unexpected error: {0}")]
pub struct Unexpected(pub(crate) &'static str);

/// An error occurring while verifying a signature against a JWK
#[derive(Debug, Error)]
pub enum JwkVerifyError {
    /// The JWK cannot be used with the presented algorithm
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),

    /// The JWK is not intended for signature verification
    #[error("key is not intended for this use")]
    UsageMismatch,

    /// The signature does not match
    #[error("signature mismatch")]
    SignatureMismatch,
}

impl JwkVerifyError {
    /// Whether the error is due to an incompatible algorithm
    #[must_use]
    pub fn is_incompatible_alg(&self) -> bool {
        matches!(self, Self::IncompatibleAlgorithm(_))
    }

    /// Whether the error is due to a usage mismatch
    #[must_use]
    pub fn is_usage_mismatch(&self) -> bool {
        matches!(self, Self::UsageMismatch)
    }

    /// Whether the error is due to a signature mismatch
    #[must_use]
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, Self::SignatureMismatch)
    }
}

/// An error occurring while producing a signature
#[derive(Debug, Error)]
pub enum SigningError {
    /// The key holds no private component and cannot sign
    #[error("cannot sign without a private key")]
    NoPrivateKey,

    /// The key is not intended for signing
    #[error("key is not intended for this use")]
    UsageMismatch,

    /// The key cannot be used with the requested algorithm
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),
}

impl From<std::convert::Infallible> for SigningError {
    fn from(_: std::convert::Infallible) -> Self {
        unreachable!("infallible result")
    }
}

/// An error occurring while verifying a JWT
#[derive(Debug, Error)]
pub enum JwtVerifyError {
    /// The JWT was rejected by the JWK
    #[error("token rejected by JWK")]
    JwkVerifyError(#[from] JwkVerifyError),

    /// The JWT could not be split into header, payload, and signature
    #[error("malformed JWT")]
    MalformedToken,

    /// The JWT header could not be decoded
    #[error("malformed JWT header")]
    MalformedHeader(#[source] Source),

    /// The JWT payload could not be decoded
    #[error("malformed JWT payload")]
    MalformedPayload(#[source] Source),

    /// The JWT signature could not be decoded
    #[error("malformed JWT signature")]
    MalformedSignature(#[source] Source),

    /// The JWT was rejected by the claims validator
    #[error("token rejected by claims validation")]
    ClaimsRejected(#[from] ClaimsRejected),
}

pub(crate) fn malformed_header(source: impl Into<Source>) -> JwtVerifyError {
    JwtVerifyError::MalformedHeader(source.into())
}

pub(crate) fn malformed_payload(source: impl Into<Source>) -> JwtVerifyError {
    JwtVerifyError::MalformedPayload(source.into())
}

pub(crate) fn malformed_signature(source: impl Into<Source>) -> JwtVerifyError {
    JwtVerifyError::MalformedSignature(source.into())
}

/// An error occurring while signing a JWT
#[derive(Debug, Error)]
pub enum JwtSigningError {
    /// The key refused to produce a signature
    #[error(transparent)]
    SigningError(#[from] SigningError),

    /// The JWT header could not be serialized
    #[error("unable to serialize JWT header")]
    MalformedHeader(#[source] Source),

    /// The JWT payload could not be serialized
    #[error("unable to serialize JWT payload")]
    MalformedPayload(#[source] Source),
}

/// A rejection raised while validating the claims of a JWT
#[derive(Debug, Error)]
pub enum ClaimsRejected {
    /// The token algorithm is not acceptable
    #[error("invalid algorithm")]
    InvalidAlgorithm,

    /// The token audience is not acceptable
    #[error("invalid audience")]
    InvalidAudience,

    /// The token issuer is not acceptable
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The token subject is not acceptable
    #[error("invalid subject")]
    InvalidSubject,

    /// The token is expired according to the `exp` claim
    #[error("token expired")]
    TokenExpired,

    /// The token is not yet valid according to the `nbf` claim
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// A required claim is missing
    #[error("required {_0} claim missing")]
    MissingRequiredClaim(&'static str),

    /// A custom validation rejected the token
    #[error(transparent)]
    Custom(Box<dyn StdError + Send + Sync>),
}
