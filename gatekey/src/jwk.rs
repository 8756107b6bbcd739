//! Key handling per the JSON Web Key (JWK) standard, [RFC7517][]
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517

use std::convert::{TryFrom, TryInto};

use aliri_braid::braid;
use serde::{Deserialize, Serialize, Serializer};

use crate::{
    error, jwa,
    jws::{self, Signer, Verifier},
};

/// An identifier for a JWK
#[braid(serde, ref_doc = "A borrowed reference to a JWK identifier ([`KeyId`])")]
pub struct KeyId;

/// An identified JSON Web Key
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "JwkDto")]
#[must_use]
pub struct Jwk {
    key_id: Option<KeyId>,
    usage: Option<jwa::Usage>,
    algorithm: Option<jwa::Algorithm>,
    key: Key,
}

impl Jwk {
    /// The key ID
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The intended usage of the key
    #[must_use]
    pub fn usage(&self) -> Option<jwa::Usage> {
        self.usage
    }

    /// The algorithm to be used with this key
    #[must_use]
    pub fn algorithm(&self) -> Option<jwa::Algorithm> {
        self.algorithm
    }

    /// Whether the key can be used with the given algorithm
    #[must_use]
    pub fn is_compatible(&self, alg: jwa::Algorithm) -> bool {
        self.key.is_compatible(alg)
    }

    /// Sets the key ID
    pub fn with_key_id(self, kid: KeyId) -> Self {
        Self {
            key_id: Some(kid),
            ..self
        }
    }

    /// Sets the key's usage
    pub fn with_usage(self, usage: jwa::Usage) -> Self {
        Self {
            usage: Some(usage),
            ..self
        }
    }

    /// Sets the algorithm, along with the usage that algorithm implies
    pub fn with_algorithm(self, alg: impl Into<jwa::Algorithm>) -> Self {
        let alg = alg.into();
        Self {
            algorithm: Some(alg),
            usage: Some(alg.to_usage()),
            ..self
        }
    }

    /// Checks the key's stated usage and algorithm against a request to
    /// sign or verify with `alg`, returning the underlying JWS algorithm
    /// when acceptable
    fn accept_for_signing_use(&self, alg: jwa::Algorithm) -> Result<jws::Algorithm, Gate> {
        if alg.to_usage() != jwa::Usage::Signing {
            return Err(Gate::UsageMismatch);
        }

        if matches!(self.usage, Some(u) if u != jwa::Usage::Signing) {
            return Err(Gate::UsageMismatch);
        }

        match self.algorithm {
            Some(key_alg) if key_alg != alg => Err(Gate::Incompatible(
                error::incompatible_algorithm(alg),
            )),
            _ => alg.try_into().map_err(Gate::Incompatible),
        }
    }
}

enum Gate {
    UsageMismatch,
    Incompatible(error::IncompatibleAlgorithm),
}

impl From<Gate> for error::JwkVerifyError {
    fn from(gate: Gate) -> Self {
        match gate {
            Gate::UsageMismatch => Self::UsageMismatch,
            Gate::Incompatible(err) => Self::IncompatibleAlgorithm(err),
        }
    }
}

impl From<Gate> for error::SigningError {
    fn from(gate: Gate) -> Self {
        match gate {
            Gate::UsageMismatch => Self::UsageMismatch,
            Gate::Incompatible(err) => Self::IncompatibleAlgorithm(err),
        }
    }
}

#[cfg(feature = "hmac")]
impl From<jwa::Hmac> for Jwk {
    fn from(key: jwa::Hmac) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::from(key),
        }
    }
}

#[cfg(feature = "rsa")]
impl From<jwa::Rsa> for Jwk {
    fn from(key: jwa::Rsa) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::from(key),
        }
    }
}

impl Verifier for Jwk {
    type Algorithm = jwa::Algorithm;
    type Error = error::JwkVerifyError;

    fn can_verify(&self, alg: Self::Algorithm) -> bool {
        if let Ok(alg) = jws::Algorithm::try_from(alg) {
            self.key.can_verify(alg)
        } else {
            false
        }
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        let alg = self.accept_for_signing_use(alg)?;
        self.key.verify(alg, data, signature)
    }
}

impl Signer for Jwk {
    type Algorithm = jwa::Algorithm;
    type Error = error::SigningError;

    fn can_sign(&self, alg: Self::Algorithm) -> bool {
        if let Ok(alg) = jws::Algorithm::try_from(alg) {
            self.key.can_sign(alg)
        } else {
            false
        }
    }

    fn sign(&self, alg: Self::Algorithm, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let alg = self.accept_for_signing_use(alg)?;
        self.key.sign(alg, data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct JwkDto {
    #[serde(rename = "kid", default)]
    key_id: Option<KeyId>,

    #[serde(rename = "use", default)]
    usage: Option<jwa::Usage>,

    #[serde(rename = "alg", default)]
    algorithm: Option<jwa::Algorithm>,

    #[serde(flatten)]
    key: Key,
}

impl TryFrom<JwkDto> for Jwk {
    type Error = error::IncompatibleAlgorithm;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        if let Some(alg) = dto.algorithm {
            if !dto.key.is_compatible(alg) {
                return Err(error::incompatible_algorithm(alg));
            }
        }

        Ok(Self {
            key_id: dto.key_id,
            usage: dto.usage,
            algorithm: dto.algorithm,
            key: dto.key,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct JwkDtoRef<'a> {
    #[serde(rename = "kid", skip_serializing_if = "Option::is_none")]
    key_id: Option<&'a KeyIdRef>,

    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    usage: Option<jwa::Usage>,

    #[serde(rename = "alg", skip_serializing_if = "Option::is_none")]
    algorithm: Option<jwa::Algorithm>,

    #[serde(flatten)]
    key: &'a Key,
}

impl Serialize for Jwk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let dto = JwkDtoRef {
            key_id: self.key_id(),
            usage: self.usage(),
            algorithm: self.algorithm(),
            key: &self.key,
        };

        dto.serialize(serializer)
    }
}

/// The key material held by a JWK
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kty")]
enum Key {
    /// RSA public key
    #[cfg(feature = "rsa")]
    #[serde(rename = "RSA")]
    Rsa(jwa::Rsa),

    /// HMAC shared secret
    #[cfg(feature = "hmac")]
    #[serde(rename = "oct")]
    Hmac(jwa::Hmac),
}

impl Key {
    fn is_compatible(&self, alg: jwa::Algorithm) -> bool {
        match alg {
            jwa::Algorithm::Signing(alg) => self.can_verify(alg),
        }
    }
}

#[cfg(feature = "hmac")]
impl From<jwa::Hmac> for Key {
    fn from(key: jwa::Hmac) -> Self {
        Self::Hmac(key)
    }
}

#[cfg(feature = "rsa")]
impl From<jwa::Rsa> for Key {
    fn from(key: jwa::Rsa) -> Self {
        Self::Rsa(key)
    }
}

impl Verifier for Key {
    type Algorithm = jws::Algorithm;
    type Error = error::JwkVerifyError;

    fn can_verify(&self, alg: Self::Algorithm) -> bool {
        match self {
            #[cfg(feature = "rsa")]
            Self::Rsa(p) => alg.try_into().map_or(false, |alg| p.can_verify(alg)),

            #[cfg(feature = "hmac")]
            Self::Hmac(p) => alg.try_into().map_or(false, |alg| p.can_verify(alg)),

            #[cfg(not(any(feature = "hmac", feature = "rsa")))]
            _ => unreachable!(),
        }
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        match self {
            #[cfg(feature = "hmac")]
            Self::Hmac(p) => p.verify(alg.try_into()?, data, signature),

            #[cfg(feature = "rsa")]
            Self::Rsa(p) => p.verify(alg.try_into()?, data, signature),

            #[cfg(not(any(feature = "hmac", feature = "rsa")))]
            _ => unreachable!(),
        }
    }
}

impl Signer for Key {
    type Algorithm = jws::Algorithm;
    type Error = error::SigningError;

    fn can_sign(&self, alg: Self::Algorithm) -> bool {
        match self {
            #[cfg(feature = "rsa")]
            Self::Rsa(p) => alg.try_into().map_or(false, |alg| p.can_sign(alg)),

            #[cfg(feature = "hmac")]
            Self::Hmac(p) => alg.try_into().map_or(false, |alg| p.can_sign(alg)),

            #[cfg(not(any(feature = "hmac", feature = "rsa")))]
            _ => unreachable!(),
        }
    }

    fn sign(&self, alg: Self::Algorithm, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        match self {
            #[cfg(feature = "hmac")]
            Self::Hmac(p) => Ok(p.sign(alg.try_into()?, data)?),

            #[cfg(feature = "rsa")]
            Self::Rsa(p) => p.sign(alg.try_into()?, data),

            #[cfg(not(any(feature = "hmac", feature = "rsa")))]
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[cfg(feature = "hmac")]
    mod hmac {
        use aliri_base64::Base64Url;

        use super::*;

        const JWK: &str = r#"{
            "kty": "oct",
            "kid": "hmac-primary",
            "use": "sig",
            "alg": "HS256",
            "k": "eW91LXNoYWxsLW5vdC1wYXNz"
        }"#;

        const JWK_MINIMAL: &str = r#"{
            "kty": "oct",
            "k": "eW91LXNoYWxsLW5vdC1wYXNz"
        }"#;

        #[test]
        fn deserializes_fully_specified_key() -> Result<()> {
            let key: Jwk = serde_json::from_str(JWK)?;
            assert_eq!(key.key_id().map(|k| k.as_str()), Some("hmac-primary"));
            assert_eq!(key.algorithm(), Some(jwa::Algorithm::HS256));
            assert_eq!(key.usage(), Some(jwa::Usage::Signing));
            Ok(())
        }

        #[test]
        fn deserializes_minimal_key() -> Result<()> {
            let key: Jwk = serde_json::from_str(JWK_MINIMAL)?;
            assert_eq!(key.algorithm(), None);
            Ok(())
        }

        #[test]
        fn signs_and_verifies() -> Result<()> {
            let key: Jwk = serde_json::from_str(JWK)?;
            let signature = key.sign(jwa::Algorithm::HS256, b"data to protect")?;
            key.verify(jwa::Algorithm::HS256, b"data to protect", &signature)?;
            Ok(())
        }

        #[test]
        fn rejects_tampered_data() -> Result<()> {
            let key: Jwk = serde_json::from_str(JWK)?;
            let signature = key.sign(jwa::Algorithm::HS256, b"data to protect")?;
            let err = key
                .verify(jwa::Algorithm::HS256, b"tampered", &signature)
                .unwrap_err();
            assert!(err.is_signature_mismatch());
            Ok(())
        }

        #[test]
        fn rejects_wrong_secret() -> Result<()> {
            let key: Jwk = serde_json::from_str(JWK)?;
            let other = Jwk::from(jwa::Hmac::new(Base64Url::from_raw(b"other".to_vec())));
            let signature = other.sign(jwa::Algorithm::HS256, b"data")?;
            let err = key
                .verify(jwa::Algorithm::HS256, b"data", &signature)
                .unwrap_err();
            assert!(err.is_signature_mismatch());
            Ok(())
        }

        #[test]
        fn rejects_algorithm_other_than_declared() -> Result<()> {
            let key: Jwk = serde_json::from_str(JWK)?;
            let err = key.verify(jwa::Algorithm::HS512, b"", b"").unwrap_err();
            assert!(err.is_incompatible_alg());
            Ok(())
        }

        #[cfg(feature = "rsa")]
        #[test]
        fn rejects_rsa_algorithm() -> Result<()> {
            let key: Jwk = serde_json::from_str(JWK_MINIMAL)?;
            let err = key.verify(jwa::Algorithm::RS256, b"", b"").unwrap_err();
            assert!(err.is_incompatible_alg());
            Ok(())
        }

        #[test]
        fn rejects_encryption_key_for_verification() {
            let key = Jwk::from(jwa::Hmac::new(Base64Url::from_raw(Vec::new())))
                .with_usage(jwa::Usage::Encryption);

            let err = key.verify(jwa::Algorithm::HS256, b"", b"").unwrap_err();
            assert!(err.is_usage_mismatch());
        }
    }

    #[cfg(feature = "rsa")]
    mod rsa {
        use aliri_base64::Base64Url;

        use super::*;

        fn rsa_jwk_json() -> String {
            let key = jwa::Rsa::from_public_components(
                Base64Url::from_raw(vec![0xAB; 256]),
                Base64Url::from_raw(vec![0x01, 0x00, 0x01]),
            )
            .unwrap();

            serde_json::to_string(
                &Jwk::from(key)
                    .with_algorithm(jwa::Algorithm::RS256)
                    .with_key_id(KeyId::from_static("rsa-primary")),
            )
            .unwrap()
        }

        #[test]
        fn round_trips_through_json() -> Result<()> {
            let json = rsa_jwk_json();
            let key: Jwk = serde_json::from_str(&json)?;
            assert_eq!(key.algorithm(), Some(jwa::Algorithm::RS256));
            assert_eq!(key.key_id().map(|k| k.as_str()), Some("rsa-primary"));
            Ok(())
        }

        #[test]
        fn rejects_undersized_modulus() {
            let err = jwa::Rsa::from_public_components(
                Base64Url::from_raw(vec![0xAB; 128]),
                Base64Url::from_raw(vec![0x01, 0x00, 0x01]),
            )
            .unwrap_err();
            let _ = format!("{err}");
        }

        #[test]
        fn refuses_to_sign() -> Result<()> {
            let key: Jwk = serde_json::from_str(&rsa_jwk_json())?;
            assert!(!key.can_sign(jwa::Algorithm::RS256));
            let err = key.sign(jwa::Algorithm::RS256, b"data").unwrap_err();
            assert!(matches!(err, error::SigningError::NoPrivateKey));
            Ok(())
        }
    }
}
