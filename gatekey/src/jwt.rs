//! Token handling per the JSON Web Token (JWT) standard, [RFC7519][]
//!
//! A compact JWT is three base64url-encoded sections joined by `.`:
//! the header, which carries the metadata used to elect a verification
//! key; the payload, which carries the claims; and the signature over the
//! first two sections. Nothing from the header or payload may be trusted
//! until the signature has been verified, which is why inspection
//! surfaces on [`Decomposed`] are labelled `untrusted_*`.
//!
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! ```
//! use aliri_base64::Base64UrlRef;
//! use gatekey::{jwa, jwt, Jwk};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key = Jwk::from(jwa::Hmac::new(Base64UrlRef::from_slice(b"secret").to_owned()))
//!     .with_algorithm(jwa::Algorithm::HS256);
//!
//! let claims = jwt::Claims::new()
//!     .with_audience(jwt::Audience::from_static("my_api"))
//!     .with_issuer(jwt::Issuer::from_static("authority"))
//!     .with_future_expiration(300);
//!
//! let token = claims.sign(&key, &jwt::Header::new(jwa::Algorithm::HS256))?;
//!
//! let validator = jwt::TokenValidator::default()
//!     .add_approved_algorithm(jwa::Algorithm::HS256)
//!     .add_allowed_audience(jwt::Audience::from_static("my_api"))
//!     .require_issuer(jwt::Issuer::from_static("authority"));
//!
//! let validated: jwt::Validated = token.verify(&key, &validator)?;
//! # let _ = validated;
//! # Ok(())
//! # }
//! ```

use std::{convert::TryFrom, fmt, time::Duration};

use aliri_base64::{Base64Url, Base64UrlRef};
use aliri_braid::braid;
use aliri_clock::{Clock, System, UnixTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{error, jwa, jwk, jws, jws::Signer, Jwk};

/// The registered claims most verifiable tokens carry, per
/// [RFC7519, section 4.1][registered]
///
/// [registered]: https://datatracker.ietf.org/doc/html/rfc7519#section-4.1
pub trait RegisteredClaims {
    /// Not before
    ///
    /// A verifier MUST reject this token before the given time.
    fn nbf(&self) -> Option<UnixTime>;

    /// Expires
    ///
    /// A verifier MUST reject this token after the given time.
    fn exp(&self) -> Option<UnixTime>;

    /// Audience
    ///
    /// A verifier MUST reject this token if none of the audiences
    /// presented is approved.
    fn aud(&self) -> &Audiences;

    /// Issuer
    ///
    /// A verifier MUST reject this token if the issuer is not approved.
    fn iss(&self) -> Option<&IssuerRef>;

    /// Subject
    ///
    /// A verifier SHOULD verify that the subject is acceptable.
    fn sub(&self) -> Option<&SubjectRef>;
}

/// Indicates that the type specifies the signing algorithm
pub trait HasAlgorithm {
    /// The algorithm used to sign the token
    fn alg(&self) -> jwa::Algorithm;
}

/// Values common to a JWT header
pub trait TokenHeader: HasAlgorithm {
    /// Key ID
    ///
    /// The ID of the JWK used to sign this token. A verifier MUST use
    /// the JWK with the specified ID to verify the token, and MAY fall
    /// back to a JWK without any ID only when no JWK carries a matching
    /// ID.
    fn kid(&self) -> Option<&jwk::KeyIdRef>;
}

/// An audience
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// An issuer of JWTs
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The subject of a JWT
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// A JSON Web Token
///
/// This type provides custom implementations of [`Display`][JwtRef#impl-Display]
/// and [`Debug`][JwtRef#impl-Debug] to prevent unintentional disclosures of
/// sensitive values. See the documentation on those trait implementations on
/// the [`JwtRef`] type for more information.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "\
    A borrowed reference to a JSON Web Token ([`Jwt`])\n\
    \n\
    This type provides custom implementations of [`Display`][Self#impl-Display] and \
    [`Debug`][Self#impl-Debug] to prevent unintentional disclosures of sensitive values. \
    See the documentation on those trait implementations for more information.
    "
)]
#[must_use]
pub struct Jwt;

impl Jwt {
    /// Constructs a signed JWT from a header and payload
    ///
    /// Both parts are serialized as JSON.
    ///
    /// # Errors
    ///
    /// * If the algorithm requested in the header cannot sign
    /// * If serialization of either the header or payload fails
    /// * If the key refuses the requested signing algorithm
    pub fn try_from_parts_with_signature<H: Serialize + HasAlgorithm, P: Serialize>(
        headers: &H,
        payload: &P,
        jwk: &Jwk,
    ) -> Result<Self, error::JwtSigningError> {
        use std::fmt::Write;

        let alg = jws::Algorithm::try_from(headers.alg())
            .map_err(error::SigningError::from)?;

        let h_raw = Base64Url::from_raw(
            serde_json::to_vec(headers)
                .map_err(|e| error::JwtSigningError::MalformedHeader(e.into()))?,
        );
        let p_raw = Base64Url::from_raw(
            serde_json::to_vec(payload)
                .map_err(|e| error::JwtSigningError::MalformedPayload(e.into()))?,
        );

        let expected_len = h_raw.encoded_len()
            + p_raw.encoded_len()
            + Base64Url::calc_encoded_len(alg.signature_size())
            + 2;

        let mut message = String::with_capacity(expected_len);
        write!(message, "{}.{}", h_raw, p_raw).expect("writes to strings never fail");

        let s = Base64Url::from_raw(jwk.sign(headers.alg(), message.as_bytes())?);

        write!(message, ".{}", s).expect("writes to strings never fail");

        debug_assert_eq!(message.len(), expected_len);

        Ok(Self::new(message))
    }
}

/// By default, this type holds potentially sensitive information. To prevent
/// unintentional disclosure of this value, this type will not print out its
/// contents without explicitly specifying the alternate debug format,
/// i.e. `{:#?}`. When specified in this form, it will print out the entire
/// header and payload, but will elide the token's signature. To change the
/// number of signature characters printed, specify the amount as a width in
/// the format string, i.e. `{:#25?}`.
///
/// If not specified, a placeholder value is printed instead.
impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str("\"")?;
            if let Some(last_period) = self.0.rfind('.') {
                f.write_str(&self.0[..=last_period])?;
                limited_reveal(&self.0[last_period + 1..], &mut *f, 0)?;
            } else {
                limited_reveal(&self.0, &mut *f, 0)?;
            }
            f.write_str("\"")
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

/// By default, this type holds potentially sensitive information. To prevent
/// unintentional disclosure of this value, this type will not print out its
/// contents without explicitly specifying the alternate format, i.e. `{:#}`.
/// When specified in this form, it prints the entire token; the number of
/// signature characters printed can be limited by specifying a width in the
/// format string, i.e. `{:#10}`.
///
/// If not specified, a placeholder value is printed instead.
impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            if let Some(last_period) = self.0.rfind('.') {
                f.write_str(&self.0[..=last_period])?;
                limited_reveal(&self.0[last_period + 1..], &mut *f, usize::MAX)
            } else {
                limited_reveal(&self.0, &mut *f, usize::MAX)
            }
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

/// The validated headers and claims of a JWT
///
/// This type can _only_ be produced within this crate, asserting that the
/// held headers and claims survived signature and claims validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validated<C = Claims, H = Header> {
    headers: H,
    claims: C,
}

impl<C, H> Validated<C, H> {
    /// Extracts the header and claims from the token
    pub fn extract(self) -> (H, C) {
        (self.headers, self.claims)
    }

    /// The validated token headers
    pub fn headers(&self) -> &H {
        &self.headers
    }

    /// The validated token claims
    pub fn claims(&self) -> &C {
        &self.claims
    }
}

/// A JWT split into its parts, with only the header decoded
///
/// Suitable for inspection to determine which key should be used to
/// validate the JWT.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Decomposed<'a, H = Header> {
    pub(crate) header: H,
    pub(crate) message: &'a str,
    pub(crate) payload: &'a str,
    pub(crate) signature: Base64Url,
}

fn split_once_rev(s: &str) -> Option<(&str, &str)> {
    let idx = s.rfind('.')?;
    Some((&s[idx + 1..], &s[..idx]))
}

impl JwtRef {
    /// Splits the JWT into its parts, preparing it for later processing
    ///
    /// # Errors
    ///
    /// Returns an error if the JWT is malformed.
    pub fn decompose<H>(&self) -> Result<Decomposed<H>, error::JwtVerifyError>
    where
        H: for<'de> Deserialize<'de>,
    {
        let (s_str, message) =
            split_once_rev(self.as_str()).ok_or(error::JwtVerifyError::MalformedToken)?;
        let (payload, h_str) =
            split_once_rev(message).ok_or(error::JwtVerifyError::MalformedToken)?;

        if h_str.contains('.') {
            return Err(error::JwtVerifyError::MalformedToken);
        }

        let h_raw = Base64Url::from_encoded(h_str).map_err(error::malformed_header)?;
        let signature = Base64Url::from_encoded(s_str).map_err(error::malformed_signature)?;
        let header: H =
            serde_json::from_slice(h_raw.as_slice()).map_err(error::malformed_header)?;

        Ok(Decomposed {
            header,
            message,
            payload,
            signature,
        })
    }

    /// Verifies a token against a particular JWK and validation plan
    ///
    /// If you need to inspect the token first to determine how to verify
    /// the token, use [`decompose()`][Self::decompose] to peek into the JWT.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid according to the validator.
    pub fn verify<C, H, V>(
        &self,
        key: &'_ V,
        validator: &TokenValidator,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + RegisteredClaims,
        H: for<'de> Deserialize<'de> + TokenHeader,
        V: jws::Verifier<Algorithm = jwa::Algorithm>,
        error::JwtVerifyError: From<V::Error>,
    {
        self.verify_with_custom(key, validator, NoopValidator)
    }

    /// Verifies a token against a particular JWK, validation plan, and
    /// custom claims validator
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid according to either the
    /// core or custom validators.
    pub fn verify_with_custom<C, H, V, X>(
        &self,
        key: &'_ V,
        validator: &TokenValidator,
        custom: X,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + RegisteredClaims,
        H: for<'de> Deserialize<'de> + TokenHeader,
        V: jws::Verifier<Algorithm = jwa::Algorithm>,
        error::JwtVerifyError: From<V::Error>,
        X: ClaimsValidator<C, H>,
    {
        self.decompose()?.verify_with_custom(key, validator, custom)
    }
}

impl<'a, H> Decomposed<'a, H>
where
    H: for<'de> Deserialize<'de> + TokenHeader,
{
    /// Verifies the decomposed JWT against the given JWK and validation plan
    ///
    /// # Errors
    ///
    /// Returns an error if the decomposed token is invalid according to
    /// the validator.
    pub fn verify<C, V>(
        self,
        key: &'_ V,
        validator: &TokenValidator,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + RegisteredClaims,
        V: jws::Verifier<Algorithm = jwa::Algorithm>,
        error::JwtVerifyError: From<V::Error>,
    {
        self.verify_with_custom(key, validator, NoopValidator)
    }

    /// Verifies the decomposed JWT against the given JWK, validation plan,
    /// and custom claims validator
    ///
    /// # Errors
    ///
    /// Returns an error if the decomposed token is invalid according to
    /// either the core or custom validator.
    pub fn verify_with_custom<C, V, X>(
        self,
        key: &'_ V,
        validator: &TokenValidator,
        custom: X,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + RegisteredClaims,
        V: jws::Verifier<Algorithm = jwa::Algorithm>,
        error::JwtVerifyError: From<V::Error>,
        X: ClaimsValidator<C, H>,
    {
        key.verify(
            self.header.alg(),
            self.message.as_bytes(),
            self.signature.as_slice(),
        )?;

        let payload: C = self.untrusted_claims()?;

        validator.validate(&self.header, &payload)?;

        custom.validate(&self.header, &payload)?;

        Ok(Validated {
            headers: self.header,
            claims: payload,
        })
    }
}

impl<'a, H> Decomposed<'a, H> {
    /// The untrusted header of the JWT
    ///
    /// **WARNING:** *This header has not been validated and must not be
    /// trusted.* An adversary can place arbitrary data into the header
    /// and payload of a JWT. To validate the header, use
    /// [`verify()`][Self::verify].
    pub fn untrusted_header(&self) -> &H {
        &self.header
    }

    /// The untrusted, still-encoded payload of the JWT
    ///
    /// **WARNING:** *This payload has not been validated and must not be
    /// trusted.* To validate the payload, use [`verify()`][Self::verify].
    pub fn untrusted_payload(&self) -> &'a str {
        self.payload
    }

    /// Decodes the payload claims without any signature verification
    ///
    /// **WARNING:** *These claims have not been validated and must not be
    /// trusted* unless the token was received directly from the issuing
    /// authority over an authenticated channel. To validate the claims,
    /// use [`verify()`][Self::verify].
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid base64url-encoded JSON
    /// matching the expected claims structure.
    pub fn untrusted_claims<C>(&self) -> Result<C, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de>,
    {
        let p_raw = Base64Url::from_encoded(self.payload).map_err(error::malformed_payload)?;
        serde_json::from_slice(p_raw.as_slice()).map_err(error::malformed_payload)
    }

    /// The untrusted message of the JWT: the encoded header and payload,
    /// separated by a `.`
    ///
    /// **WARNING:** *This message has not been validated and must not be
    /// trusted.* To validate the JWT, use [`verify()`][Self::verify].
    pub fn untrusted_message(&self) -> &'a str {
        self.message
    }

    /// The raw signature of the JWT
    pub fn signature(&self) -> &Base64UrlRef {
        &self.signature
    }
}

impl<'a, H> HasAlgorithm for Decomposed<'a, H>
where
    H: HasAlgorithm,
{
    fn alg(&self) -> jwa::Algorithm {
        self.header.alg()
    }
}

impl<'a, H> TokenHeader for Decomposed<'a, H>
where
    H: TokenHeader,
{
    fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.header.kid()
    }
}

/// A set of zero or more [`Audience`]s
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany<Audience>", into = "OneOrMany<Audience>")]
#[repr(transparent)]
#[must_use]
pub struct Audiences(Vec<Audience>);

impl Audiences {
    /// An empty audience set
    #[inline]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// An audience set with a single audience
    #[inline]
    pub fn single(aud: impl Into<Audience>) -> Self {
        Self(vec![aud.into()])
    }

    /// Indicates whether the audience set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates through references to the audiences in the set
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &AudienceRef> {
        self.0.iter().map(AsRef::as_ref)
    }
}

impl From<OneOrMany<Audience>> for Audiences {
    #[inline]
    fn from(vals: OneOrMany<Audience>) -> Self {
        match vals {
            OneOrMany::One(x) => Self(vec![x]),
            OneOrMany::Many(v) => Self(v),
        }
    }
}

impl From<Audiences> for OneOrMany<Audience> {
    #[inline]
    fn from(mut vec: Audiences) -> Self {
        if vec.0.len() == 1 {
            Self::One(vec.0.pop().unwrap())
        } else {
            Self::Many(vec.0)
        }
    }
}

impl From<Vec<Audience>> for Audiences {
    #[inline]
    fn from(vals: Vec<Audience>) -> Self {
        Self(vals)
    }
}

impl From<Audience> for Audiences {
    #[inline]
    fn from(aud: Audience) -> Self {
        Self::single(aud)
    }
}

/// A type representing one or more items, primarily for serialization
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A single item
    One(T),

    /// Zero or more items, serialized as an array
    Many(Vec<T>),
}

/// A custom claims validator
pub trait ClaimsValidator<C, H> {
    /// Validates the header and payload claims decoded from a JWT
    ///
    /// # Errors
    ///
    /// Returns an error if the header or payload claims are invalid
    /// according to the validator.
    fn validate(&self, header: &H, claims: &C) -> Result<(), error::ClaimsRejected>;
}

impl<C, H, T> ClaimsValidator<C, H> for &'_ T
where
    T: ClaimsValidator<C, H>,
{
    #[inline]
    fn validate(&self, header: &H, claims: &C) -> Result<(), error::ClaimsRejected> {
        T::validate(&**self, header, claims)
    }
}

impl<C, H, T> ClaimsValidator<C, H> for Box<T>
where
    T: ClaimsValidator<C, H>,
{
    #[inline]
    fn validate(&self, header: &H, claims: &C) -> Result<(), error::ClaimsRejected> {
        T::validate(&**self, header, claims)
    }
}

/// A validator that makes no checks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NoopValidator;

impl<C, H> ClaimsValidator<C, H> for NoopValidator {
    #[inline]
    fn validate(&self, _header: &H, _claims: &C) -> Result<(), error::ClaimsRejected> {
        Ok(())
    }
}

/// The validation plan applied to every verified token
///
/// The default plan approves no algorithms and requires that the token
/// is not expired, with no grace period.
#[derive(Clone, Debug)]
#[must_use]
pub struct TokenValidator {
    approved_algorithms: Vec<jwa::Algorithm>,
    leeway: Duration,
    validate_nbf: bool,
    validate_exp: bool,
    allowed_audiences: Vec<Audience>,
    valid_subjects: Option<Regex>,
    issuer: Option<Issuer>,
}

impl Default for TokenValidator {
    #[inline]
    fn default() -> Self {
        Self {
            approved_algorithms: Vec::new(),
            leeway: Duration::default(),
            validate_exp: true,
            validate_nbf: false,
            allowed_audiences: Vec::new(),
            valid_subjects: None,
            issuer: None,
        }
    }
}

impl TokenValidator {
    /// Allows a grace period for token validation
    ///
    /// Applies on either side of the "not before" and "expires" claims.
    #[inline]
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Allows a grace period (in seconds) for token validation
    #[inline]
    pub fn with_leeway_secs(self, leeway: u64) -> Self {
        Self {
            leeway: Duration::from_secs(leeway),
            ..self
        }
    }

    /// Enforces expiration checks
    #[inline]
    pub fn check_expiration(self) -> Self {
        Self {
            validate_exp: true,
            ..self
        }
    }

    /// Enforces "not valid before" checks
    #[inline]
    pub fn check_not_before(self) -> Self {
        Self {
            validate_nbf: true,
            ..self
        }
    }

    /// Skips expiration checks
    #[inline]
    pub fn ignore_expiration(self) -> Self {
        Self {
            validate_exp: false,
            ..self
        }
    }

    /// Skips "not valid before" checks
    #[inline]
    pub fn ignore_not_before(self) -> Self {
        Self {
            validate_nbf: false,
            ..self
        }
    }

    /// Adds a single audience to the allow-list
    #[inline]
    pub fn add_allowed_audience(mut self, audience: Audience) -> Self {
        self.allowed_audiences.push(audience);
        self
    }

    /// Adds multiple audiences to the allow-list
    #[inline]
    pub fn extend_allowed_audiences<I: IntoIterator<Item = Audience>>(mut self, auds: I) -> Self {
        self.allowed_audiences.extend(auds);
        self
    }

    /// Approves a single algorithm
    #[inline]
    pub fn add_approved_algorithm(mut self, alg: jwa::Algorithm) -> Self {
        self.approved_algorithms.push(alg);
        self
    }

    /// Approves multiple algorithms
    #[inline]
    pub fn extend_approved_algorithms<I: IntoIterator<Item = jwa::Algorithm>>(
        mut self,
        algs: I,
    ) -> Self {
        self.approved_algorithms.extend(algs);
        self
    }

    /// Requires that tokens specify a particular issuer
    #[inline]
    pub fn require_issuer(self, issuer: Issuer) -> Self {
        Self {
            issuer: Some(issuer),
            ..self
        }
    }

    /// Requires that the `sub` claim exists and matches a particular
    /// regular expression
    #[inline]
    pub fn check_subject(self, sub_regex: Regex) -> Self {
        Self {
            valid_subjects: Some(sub_regex),
            ..self
        }
    }

    pub(crate) fn validate<H: TokenHeader, T: RegisteredClaims>(
        &self,
        header: &H,
        claims: &T,
    ) -> Result<(), error::ClaimsRejected> {
        self.validate_with_clock(header, claims, &System)
    }

    pub(crate) fn validate_with_clock<C: Clock, H: TokenHeader, T: RegisteredClaims>(
        &self,
        header: &H,
        claims: &T,
        clock: &C,
    ) -> Result<(), error::ClaimsRejected> {
        let now = clock.now();

        if !self.approved_algorithms.is_empty()
            && !self.approved_algorithms.iter().any(|&a| header.alg() == a)
        {
            return Err(error::ClaimsRejected::InvalidAlgorithm);
        }

        if self.validate_exp {
            let exp = claims
                .exp()
                .ok_or(error::ClaimsRejected::MissingRequiredClaim("exp"))?;
            if exp.0 < now.0.saturating_sub(self.leeway.as_secs()) {
                return Err(error::ClaimsRejected::TokenExpired);
            }
        }

        if self.validate_nbf {
            let nbf = claims
                .nbf()
                .ok_or(error::ClaimsRejected::MissingRequiredClaim("nbf"))?;
            if nbf.0 > now.0.saturating_add(self.leeway.as_secs()) {
                return Err(error::ClaimsRejected::TokenNotYetValid);
            }
        }

        if !self.allowed_audiences.is_empty() {
            if claims.aud().is_empty() {
                return Err(error::ClaimsRejected::MissingRequiredClaim("aud"));
            }

            let approved = claims
                .aud()
                .iter()
                .any(|a| self.allowed_audiences.iter().any(|e| a == e));
            if !approved {
                return Err(error::ClaimsRejected::InvalidAudience);
            }
        }

        if let Some(allowed_iss) = &self.issuer {
            let iss = claims
                .iss()
                .ok_or(error::ClaimsRejected::MissingRequiredClaim("iss"))?;
            if iss != allowed_iss {
                return Err(error::ClaimsRejected::InvalidIssuer);
            }
        }

        if let Some(valid_subs) = &self.valid_subjects {
            let sub = claims
                .sub()
                .ok_or(error::ClaimsRejected::MissingRequiredClaim("sub"))?;
            if !valid_subs.is_match(sub.as_str()) {
                return Err(error::ClaimsRejected::InvalidSubject);
            }
        }

        Ok(())
    }
}

/// Minimal header for common JWTs
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Header {
    alg: jwa::Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<jwk::KeyId>,
}

impl Header {
    /// Constructs a JWT header for the specified signing algorithm
    pub const fn new(alg: jwa::Algorithm) -> Self {
        Self { alg, kid: None }
    }

    /// Constructs a JWT header with a signing algorithm and key ID
    pub fn with_key_id(alg: jwa::Algorithm, kid: impl Into<jwk::KeyId>) -> Self {
        Self {
            alg,
            kid: Some(kid.into()),
        }
    }
}

impl HasAlgorithm for Header {
    fn alg(&self) -> jwa::Algorithm {
        self.alg
    }
}

impl TokenHeader for Header {
    fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.kid.as_deref()
    }
}

/// The registered claims of a common JWT
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Audiences::is_empty")]
    aud: Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
}

impl Default for Claims {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisteredClaims for Claims {
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    fn aud(&self) -> &Audiences {
        &self.aud
    }

    fn iss(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    fn sub(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }
}

impl Claims {
    /// Constructs a new, empty set of claims
    pub const fn new() -> Self {
        Self {
            aud: Audiences::empty(),
            iss: None,
            sub: None,
            exp: None,
            nbf: None,
        }
    }

    /// Sets the `aud` claim
    pub fn with_audience(mut self, aud: impl Into<Audience>) -> Self {
        self.aud = Audiences::single(aud);
        self
    }

    /// Sets the `aud` claim, where multiple audiences are allowed
    pub fn with_audiences(mut self, aud: impl Into<Audiences>) -> Self {
        self.aud = aud.into();
        self
    }

    /// Sets the `iss` claim
    pub fn with_issuer(mut self, iss: impl Into<Issuer>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the `sub` claim
    pub fn with_subject(mut self, sub: impl Into<Subject>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Sets the `exp` claim relative to the system clock
    pub fn with_future_expiration(self, secs: u64) -> Self {
        self.with_future_expiration_from_clock(secs, &System)
    }

    /// Sets the `exp` claim relative to the specified clock
    pub fn with_future_expiration_from_clock<C: Clock>(mut self, secs: u64, clock: &C) -> Self {
        let now = clock.now();
        self.exp = Some(UnixTime(now.0 + secs));
        self
    }

    /// Sets the `exp` claim
    pub fn with_expiration(mut self, time: UnixTime) -> Self {
        self.exp = Some(time);
        self
    }

    /// Sets the `nbf` claim
    pub fn with_not_before(mut self, time: UnixTime) -> Self {
        self.nbf = Some(time);
        self
    }

    /// Produces a signed JWT with the given header and these claims
    ///
    /// # Errors
    ///
    /// Returns an error if the signature cannot be produced.
    pub fn sign<H: Serialize + HasAlgorithm>(
        &self,
        jwk: &Jwk,
        headers: &H,
    ) -> Result<Jwt, error::JwtSigningError> {
        Jwt::try_from_parts_with_signature(headers, self, jwk)
    }
}

#[cfg(test)]
mod tests {
    use aliri_clock::TestClock;
    use color_eyre::Result;

    use super::*;

    #[test]
    fn deserializes_sparse_claims() -> Result<()> {
        const DATA: &str = r#"{
                "nbf": 345,
                "iss": "me"
            }"#;

        let claims: Claims = serde_json::from_str(DATA)?;
        assert_eq!(claims.nbf(), Some(UnixTime(345)));
        assert_eq!(claims.iss().map(|i| i.as_str()), Some("me"));
        assert!(claims.aud().is_empty());
        Ok(())
    }

    #[test]
    fn deserializes_audience_array() -> Result<()> {
        const DATA: &str = r#"{"aud": ["one", "two"]}"#;

        let claims: Claims = serde_json::from_str(DATA)?;
        assert_eq!(claims.aud().iter().count(), 2);
        Ok(())
    }

    #[test]
    fn accepts_claims_within_plan() -> Result<(), error::ClaimsRejected> {
        let validator = TokenValidator::default()
            .with_leeway(Duration::from_secs(2))
            .check_not_before()
            .extend_allowed_audiences(vec![
                Audience::from_static("one"),
                Audience::from_static("two"),
            ])
            .require_issuer(Issuer::from_static("me"));

        let claims = Claims::new()
            .with_not_before(UnixTime(9))
            .with_expiration(UnixTime(5))
            .with_audience(Audience::from_static("one"))
            .with_issuer(Issuer::from_static("me"));

        let clock = TestClock::new(UnixTime(7));
        let header = Header::new(test_alg());

        validator.validate_with_clock(&header, &claims, &clock)
    }

    #[test]
    fn rejects_expired_token() {
        let validator = TokenValidator::default();
        let claims = Claims::new().with_expiration(UnixTime(5));
        let clock = TestClock::new(UnixTime(100));

        let err = validator
            .validate_with_clock(&Header::new(test_alg()), &claims, &clock)
            .unwrap_err();

        assert!(matches!(err, error::ClaimsRejected::TokenExpired));
    }

    #[test]
    fn expiry_leeway_is_honored() {
        let validator = TokenValidator::default().with_leeway_secs(60);
        let claims = Claims::new().with_expiration(UnixTime(100));
        let clock = TestClock::new(UnixTime(150));

        assert!(validator
            .validate_with_clock(&Header::new(test_alg()), &claims, &clock)
            .is_ok());
    }

    #[test]
    fn rejects_missing_expiration_when_required() {
        let validator = TokenValidator::default();
        let claims = Claims::new();
        let clock = TestClock::new(UnixTime(0));

        let err = validator
            .validate_with_clock(&Header::new(test_alg()), &claims, &clock)
            .unwrap_err();

        assert!(matches!(
            err,
            error::ClaimsRejected::MissingRequiredClaim("exp")
        ));
    }

    #[test]
    fn rejects_unapproved_audience() {
        let validator = TokenValidator::default()
            .ignore_expiration()
            .add_allowed_audience(Audience::from_static("expected"));

        let claims = Claims::new().with_audience(Audience::from_static("other"));
        let clock = TestClock::new(UnixTime(0));

        let err = validator
            .validate_with_clock(&Header::new(test_alg()), &claims, &clock)
            .unwrap_err();

        assert!(matches!(err, error::ClaimsRejected::InvalidAudience));
    }

    #[test]
    fn rejects_unapproved_algorithm() {
        let validator = TokenValidator::default()
            .ignore_expiration()
            .add_approved_algorithm(jwa::Algorithm::HS512);

        let claims = Claims::new();
        let clock = TestClock::new(UnixTime(0));

        let err = validator
            .validate_with_clock(&Header::new(jwa::Algorithm::HS256), &claims, &clock)
            .unwrap_err();

        assert!(matches!(err, error::ClaimsRejected::InvalidAlgorithm));
    }

    #[test]
    fn rejects_wrong_issuer() {
        let validator = TokenValidator::default()
            .ignore_expiration()
            .require_issuer(Issuer::from_static("me"));

        let claims = Claims::new().with_issuer(Issuer::from_static("you"));
        let clock = TestClock::new(UnixTime(0));

        let err = validator
            .validate_with_clock(&Header::new(test_alg()), &claims, &clock)
            .unwrap_err();

        assert!(matches!(err, error::ClaimsRejected::InvalidIssuer));
    }

    #[cfg(feature = "hmac")]
    fn test_alg() -> jwa::Algorithm {
        jwa::Algorithm::HS256
    }

    #[cfg(all(not(feature = "hmac"), feature = "rsa"))]
    fn test_alg() -> jwa::Algorithm {
        jwa::Algorithm::RS256
    }

    #[cfg(feature = "hmac")]
    mod round_trip {
        use aliri_base64::Base64Url;

        use super::*;

        fn signing_key() -> Jwk {
            Jwk::from(jwa::Hmac::new(Base64Url::from_raw(b"a shared secret".to_vec())))
                .with_algorithm(jwa::Algorithm::HS256)
                .with_key_id(jwk::KeyId::from_static("test"))
        }

        fn signed_token() -> Jwt {
            let claims = Claims::new()
                .with_audience(Audience::from_static("my_api"))
                .with_issuer(Issuer::from_static("authority"))
                .with_subject(Subject::from_static("user-1"))
                .with_future_expiration(300);

            claims
                .sign(
                    &signing_key(),
                    &Header::with_key_id(jwa::Algorithm::HS256, jwk::KeyId::from_static("test")),
                )
                .expect("signing should succeed")
        }

        #[test]
        fn valid_token_verifies() -> Result<()> {
            let token = signed_token();

            let validator = TokenValidator::default()
                .add_approved_algorithm(jwa::Algorithm::HS256)
                .add_allowed_audience(Audience::from_static("my_api"))
                .require_issuer(Issuer::from_static("authority"));

            let validated: Validated = token.verify(&signing_key(), &validator)?;
            assert_eq!(
                validated.claims().sub().map(|s| s.as_str()),
                Some("user-1")
            );
            Ok(())
        }

        #[test]
        fn tampered_signature_is_rejected() {
            let token = signed_token();
            let mut raw = token.as_str().to_string();
            raw.truncate(raw.len() - 2);
            raw.push_str("xx");
            let tampered = Jwt::new(raw);

            let validator = TokenValidator::default().ignore_expiration();
            let err = tampered
                .verify::<Claims, Header, _>(&signing_key(), &validator)
                .unwrap_err();

            assert!(matches!(err, error::JwtVerifyError::JwkVerifyError(_)));
        }

        #[test]
        fn token_without_dots_is_malformed() {
            let garbage = JwtRef::from_str("garbage");
            let err = garbage.decompose::<Header>().unwrap_err();
            assert!(matches!(err, error::JwtVerifyError::MalformedToken));
        }

        #[test]
        fn token_with_extra_sections_is_malformed() {
            let garbage = JwtRef::from_str("a.b.c.d");
            let err = garbage.decompose::<Header>().unwrap_err();
            assert!(matches!(err, error::JwtVerifyError::MalformedToken));
        }

        #[test]
        fn untrusted_claims_decode_without_verification() -> Result<()> {
            let token = signed_token();
            let decomposed: Decomposed = token.decompose()?;
            let claims: Claims = decomposed.untrusted_claims()?;
            assert_eq!(claims.iss().map(|i| i.as_str()), Some("authority"));
            Ok(())
        }

        #[test]
        fn default_formats_redact_the_token() {
            let token = signed_token();
            assert_eq!(format!("{}", token), "***JWT***");
            assert_eq!(format!("{:?}", token), "***JWT***");
        }
    }
}
