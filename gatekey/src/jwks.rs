use serde::{Deserialize, Serialize};

use crate::{jwa, jwk, Jwk};

/// A JSON Web Key Set (JWKS)
///
/// Key sets published by identity providers routinely carry keys this
/// crate cannot use (encryption keys, unsupported algorithms). Such
/// entries are skipped during deserialization rather than poisoning the
/// entire set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    #[serde(deserialize_with = "deserialize_known_keys")]
    keys: Vec<Jwk>,
}

impl Jwks {
    /// Adds a key to the set
    pub fn add_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }

    /// A view of the keys in this set
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Selects the best key for the given key ID (if any) and algorithm
    ///
    /// When the token names a key ID, only keys bearing that ID or no ID
    /// at all are eligible. Among eligible keys, those that explicitly
    /// declare the matching ID, algorithm, or usage are preferred over
    /// keys that leave them unspecified.
    pub fn select_key<A: Into<jwa::Algorithm>>(
        &self,
        kid: Option<&jwk::KeyIdRef>,
        alg: A,
    ) -> Option<&Jwk> {
        let alg = alg.into();

        self.keys
            .iter()
            .filter_map(|key| rank_key(key, kid, alg).map(|rank| (rank, key)))
            .max_by_key(|(rank, _)| *rank)
            .map(|(_, key)| key)
    }

    /// Selects the best key bearing the given key ID for the algorithm
    pub fn key_by_id<A: Into<jwa::Algorithm>>(
        &self,
        kid: &jwk::KeyIdRef,
        alg: A,
    ) -> Option<&Jwk> {
        self.select_key(Some(kid), alg)
    }

    /// Selects the best key for the algorithm, ignoring key IDs
    pub fn key_for_alg<A: Into<jwa::Algorithm>>(&self, alg: A) -> Option<&Jwk> {
        self.select_key(None, alg)
    }
}

/// Ranks a key's fitness for a request, or `None` if the key is unusable
///
/// Explicit matches outrank unspecified attributes: a matching key ID
/// dominates, then a declared algorithm, then a declared usage.
fn rank_key(key: &Jwk, kid: Option<&jwk::KeyIdRef>, alg: jwa::Algorithm) -> Option<u8> {
    if !key.is_compatible(alg) {
        return None;
    }

    let mut rank = 0;

    if let Some(kid) = kid {
        match key.key_id() {
            Some(key_id) if key_id == kid => rank += 4,
            Some(_) => return None,
            None => {}
        }
    }

    if let Some(key_alg) = key.algorithm() {
        if key_alg != alg {
            return None;
        }
        rank += 2;
    }

    if let Some(usage) = key.usage() {
        if usage != alg.to_usage() {
            return None;
        }
        rank += 1;
    }

    Some(rank)
}

fn deserialize_known_keys<'de, D>(deserializer: D) -> Result<Vec<Jwk>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct KnownKeysVisitor;

    impl<'de> serde::de::Visitor<'de> for KnownKeysVisitor {
        type Value = Vec<Jwk>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a list of JWK objects")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut keys = Vec::with_capacity(seq.size_hint().unwrap_or_default());
            let mut index = 0_usize;

            while let Some(entry) = seq.next_element::<MaybeJwk>()? {
                match entry {
                    MaybeJwk::Known(key) => keys.push(key),
                    MaybeJwk::Unknown(key) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            jwks.idx = index,
                            jwk.kid = ?key.kid,
                            "jwk.use" = ?key.r#use,
                            jwk.alg = ?key.alg,
                            "skipping unusable JWK"
                        );
                        let _ = (index, key);
                    }
                }
                index += 1;
            }

            Ok(keys)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeJwk {
        Known(Jwk),
        Unknown(UnknownJwk),
    }

    #[allow(dead_code)]
    #[derive(Deserialize)]
    struct UnknownJwk {
        #[serde(default)]
        kid: Option<jwk::KeyId>,
        #[serde(rename = "use", default)]
        r#use: Option<String>,
        #[serde(default)]
        alg: Option<String>,
    }

    deserializer.deserialize_seq(KnownKeysVisitor)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    const JWKS_WITH_UNKNOWN_ALG: &str = r#"
        {
            "keys": [
                {
                    "kid": "1",
                    "use": "enc",
                    "alg": "RSA-OAEP"
                }
            ]
        }
    "#;

    const JWKS_WITH_EMPTY_KEY: &str = r#"
        {
            "keys": [
                {}
            ]
        }
    "#;

    #[test]
    fn skips_keys_with_unknown_algorithms() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(JWKS_WITH_UNKNOWN_ALG)?;
        assert!(jwks.keys().is_empty());
        Ok(())
    }

    #[test]
    fn skips_empty_key_entries() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(JWKS_WITH_EMPTY_KEY)?;
        assert!(jwks.keys().is_empty());
        Ok(())
    }

    #[cfg(feature = "hmac")]
    mod selection {
        use aliri_base64::Base64Url;

        use super::*;
        use crate::jwa;

        fn hmac_key(kid: Option<&str>, alg: Option<jwa::Algorithm>) -> Jwk {
            let mut key = Jwk::from(jwa::Hmac::new(Base64Url::from_raw(b"secret".to_vec())));
            if let Some(kid) = kid {
                key = key.with_key_id(jwk::KeyId::from(kid));
            }
            if let Some(alg) = alg {
                key = key.with_algorithm(alg);
            }
            key
        }

        #[test]
        fn prefers_matching_key_id() {
            let mut jwks = Jwks::default();
            jwks.add_key(hmac_key(Some("a"), Some(jwa::Algorithm::HS256)));
            jwks.add_key(hmac_key(Some("b"), Some(jwa::Algorithm::HS256)));

            let selected = jwks
                .select_key(
                    Some(jwk::KeyIdRef::from_str("b")),
                    jwa::Algorithm::HS256,
                )
                .expect("a key should be selected");

            assert_eq!(selected.key_id().map(|k| k.as_str()), Some("b"));
        }

        #[test]
        fn unknown_key_id_falls_back_to_anonymous_key() {
            let mut jwks = Jwks::default();
            jwks.add_key(hmac_key(Some("a"), Some(jwa::Algorithm::HS256)));
            jwks.add_key(hmac_key(None, Some(jwa::Algorithm::HS256)));

            let selected = jwks
                .select_key(
                    Some(jwk::KeyIdRef::from_str("missing")),
                    jwa::Algorithm::HS256,
                )
                .expect("the anonymous key should be usable");

            assert_eq!(selected.key_id(), None);
        }

        #[test]
        fn no_key_for_unknown_key_id_without_fallback() {
            let mut jwks = Jwks::default();
            jwks.add_key(hmac_key(Some("a"), Some(jwa::Algorithm::HS256)));

            let selected = jwks.select_key(
                Some(jwk::KeyIdRef::from_str("missing")),
                jwa::Algorithm::HS256,
            );

            assert!(selected.is_none());
        }

        #[test]
        fn declared_algorithm_outranks_unspecified() {
            let mut jwks = Jwks::default();
            jwks.add_key(hmac_key(None, None));
            jwks.add_key(hmac_key(None, Some(jwa::Algorithm::HS384)));

            let selected = jwks
                .key_for_alg(jwa::Algorithm::HS384)
                .expect("a key should be selected");

            assert_eq!(selected.algorithm(), Some(jwa::Algorithm::HS384));
        }

        #[test]
        fn mismatched_declared_algorithm_is_ineligible() {
            let mut jwks = Jwks::default();
            jwks.add_key(hmac_key(None, Some(jwa::Algorithm::HS256)));

            assert!(jwks.key_for_alg(jwa::Algorithm::HS512).is_none());
        }
    }
}
