use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use gatekey::{
    jwt::{self, HasAlgorithm, TokenHeader},
    Jwks, JwtRef,
};
#[cfg(feature = "reqwest")]
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode,
};
use serde::Deserialize;
use thiserror::Error;

use crate::{HasScope, Policy, ScopePolicy};

/// An error returned when an authority refuses a presented token
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// No key in the key set matches the specifications in the token
    /// header
    #[error("no matching key found to validate JWT")]
    UnknownKeyId,

    /// The JWT was malformed or otherwise defective
    #[error("invalid JWT")]
    JwtVerifyError(#[from] gatekey::error::JwtVerifyError),

    /// The JWT was acceptable, but does not grant the level of access
    /// required by the policy
    #[error("access denied by policy")]
    PolicyDenial(#[from] crate::InsufficientScope),
}

#[derive(Debug)]
struct CachedKeys {
    jwks: Jwks,
    #[cfg(feature = "reqwest")]
    etag: Option<HeaderValue>,
    #[cfg(feature = "reqwest")]
    last_modified: Option<HeaderValue>,
}

impl CachedKeys {
    fn new(jwks: Jwks) -> Self {
        Self {
            jwks,
            #[cfg(feature = "reqwest")]
            etag: None,
            #[cfg(feature = "reqwest")]
            last_modified: None,
        }
    }
}

#[cfg(feature = "reqwest")]
#[derive(Debug)]
struct RemoteSource {
    jwks_url: String,
    client: Client,
}

#[derive(Debug)]
struct Inner {
    keys: ArcSwap<CachedKeys>,
    #[cfg(feature = "reqwest")]
    remote: Option<RemoteSource>,
    validator: jwt::TokenValidator,
}

/// An authority that authenticates tokens against a JSON Web Key Set and
/// authorizes the access they grant
///
/// The key set may be held locally or fetched from a remote identity
/// provider, in which case it can be periodically refreshed in the
/// background. Verification never blocks on a refresh; readers observe
/// the key set through a lock-free swap.
#[derive(Debug, Clone)]
#[must_use]
pub struct Authority {
    inner: Arc<Inner>,
}

impl Authority {
    /// Constructs a new authority from an existing JWKS
    pub fn new(jwks: Jwks, validator: jwt::TokenValidator) -> Self {
        Self {
            inner: Arc::new(Inner {
                keys: ArcSwap::from_pointee(CachedKeys::new(jwks)),
                #[cfg(feature = "reqwest")]
                remote: None,
                validator,
            }),
        }
    }

    /// Constructs a new authority backed by the JWKS published at the
    /// given URL
    ///
    /// # Errors
    ///
    /// Returns an error if the initial key set cannot be fetched or
    /// parsed.
    #[cfg(feature = "reqwest")]
    pub async fn from_remote(
        jwks_url: String,
        validator: jwt::TokenValidator,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("gatekey_oauth2/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let response = client.get(&jwks_url).send().await?;
        response.error_for_status_ref()?;

        let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);
        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .map(ToOwned::to_owned);
        let jwks = response.json::<Jwks>().await?;

        tracing::info!(jwks.url = %jwks_url, "JWKS loaded");

        Ok(Self {
            inner: Arc::new(Inner {
                keys: ArcSwap::from_pointee(CachedKeys {
                    jwks,
                    etag,
                    last_modified,
                }),
                remote: Some(RemoteSource { jwks_url, client }),
                validator,
            }),
        })
    }

    /// Constructs a new authority by locating the provider's JWKS
    /// through its OIDC discovery document
    ///
    /// # Errors
    ///
    /// Returns an error if the discovery document or the key set cannot
    /// be fetched or parsed.
    #[cfg(feature = "reqwest")]
    pub async fn discover(
        discovery_url: &str,
        validator: jwt::TokenValidator,
    ) -> Result<Self, reqwest::Error> {
        let metadata = crate::oidc::fetch_provider_metadata(discovery_url).await?;
        Self::from_remote(metadata.jwks_uri, validator).await
    }

    /// Spawns a non-terminating background task that refreshes the JWKS
    /// on the given interval
    ///
    /// Refresh failures are ignored; the next tick tries again.
    #[cfg(feature = "tokio")]
    pub fn spawn_refresh(&self, interval: Duration) {
        let this = self.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                let _ = this.refresh().await;
            }
        });
    }

    /// Refreshes the JWKS from the remote URL
    ///
    /// Uses conditional requests where the remote supports them. No
    /// retries are attempted, and the cached key set is left untouched on
    /// any failure.
    #[cfg(feature = "reqwest")]
    #[tracing::instrument(skip(self), fields(jwks.url = tracing::field::Empty))]
    pub async fn refresh(&self) -> Result<(), reqwest::Error> {
        let Some(remote) = &self.inner.remote else {
            return Ok(());
        };

        tracing::Span::current().record("jwks.url", &remote.jwks_url);
        tracing::debug!("refreshing JWKS");

        let mut request = remote.client.get(&remote.jwks_url);

        {
            let keys = self.inner.keys.load();
            if let Some(etag) = &keys.etag {
                request = request.header(header::IF_NONE_MATCH, etag)
            } else if let Some(last_modified) = &keys.last_modified {
                request = request.header(header::IF_MODIFIED_SINCE, last_modified)
            }
        }

        let response = request.send().await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!("JWKS not modified");
            return Ok(());
        } else if let Err(err) = response.error_for_status_ref() {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(
                error,
                http.status_code = response.status().as_u16(),
                "JWKS refresh failed; unexpected response status",
            );
            return Err(err);
        }

        let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);
        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .map(ToOwned::to_owned);

        match response.json::<Jwks>().await {
            Ok(jwks) => {
                self.inner.keys.store(Arc::new(CachedKeys {
                    jwks,
                    etag,
                    last_modified,
                }));
                tracing::info!("JWKS refreshed");
                Ok(())
            }
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "JWKS refresh failed; unexpected error");
                Err(err)
            }
        }
    }

    /// Refreshes the JWKS from the remote URL
    ///
    /// Without the `reqwest` feature there is no remote to refresh from,
    /// so this is a no-op.
    #[cfg(not(feature = "reqwest"))]
    #[tracing::instrument]
    pub async fn refresh(&self) -> Result<(), std::convert::Infallible> {
        Ok(())
    }

    /// Replaces the cached key set
    pub fn set_jwks(&self, jwks: Jwks) {
        self.inner.keys.store(Arc::new(CachedKeys::new(jwks)));
    }

    /// Authenticates the token and checks access according to the policy
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid or is not authorized by
    /// the policy.
    pub fn verify_token<T>(&self, token: &JwtRef, policy: &ScopePolicy) -> Result<T, AuthorityError>
    where
        T: for<'de> Deserialize<'de> + HasScope + jwt::RegisteredClaims,
    {
        let decomposed = token.decompose()?;

        let validated: jwt::Validated<T>;
        {
            let keys = self.inner.keys.load();

            let kid = decomposed.kid();
            let alg = decomposed.alg();

            let key = keys.jwks.select_key(kid, alg).ok_or_else(|| {
                if let Some(kid) = kid {
                    tracing::debug!(%kid, %alg, "unable to find matching key");
                } else {
                    tracing::debug!(%alg, "unable to find matching key");
                }
                AuthorityError::UnknownKeyId
            })?;

            validated = decomposed.verify(key, &self.inner.validator)?;
        }

        policy.evaluate(validated.claims().scope())?;

        let (_, validated_claims) = validated.extract();

        Ok(validated_claims)
    }
}

#[cfg(test)]
#[cfg(feature = "hmac")]
mod tests {
    use aliri_base64::Base64Url;
    use gatekey::{jwa, jwk, Jwk};

    use super::*;
    use crate::{policy, scope, scope::ClaimsWithScope};

    const KEY_ID: &str = "issuer-key";

    fn signing_key() -> Jwk {
        Jwk::from(jwa::Hmac::new(Base64Url::from_raw(b"hub secret".to_vec())))
            .with_algorithm(jwa::Algorithm::HS256)
            .with_key_id(jwk::KeyId::from_static(KEY_ID))
    }

    fn authority() -> Authority {
        let mut jwks = Jwks::default();
        jwks.add_key(signing_key());

        let validator = jwt::TokenValidator::default()
            .add_approved_algorithm(jwa::Algorithm::HS256)
            .add_allowed_audience(jwt::Audience::from_static("account"));

        Authority::new(jwks, validator)
    }

    fn token_with_scope(scope: &str) -> gatekey::Jwt {
        #[derive(serde::Serialize)]
        struct Payload<'a> {
            aud: &'a str,
            exp: u64,
            scope: &'a str,
        }

        let header = jwt::Header::with_key_id(
            jwa::Algorithm::HS256,
            jwk::KeyId::from_static(KEY_ID),
        );
        let payload = Payload {
            aud: "account",
            exp: aliri_clock::Clock::now(&aliri_clock::System).0 + 300,
            scope,
        };

        gatekey::Jwt::try_from_parts_with_signature(&header, &payload, &signing_key())
            .expect("token should sign")
    }

    #[test]
    fn valid_token_with_satisfied_scope_is_accepted() {
        let authority = authority();
        let token = token_with_scope("example:doc:read example:doc:create");

        let claims: ClaimsWithScope = authority
            .verify_token(&token, &policy![scope!["example:doc:read"]])
            .expect("token should be accepted");

        assert!(claims.scope.contains_all(&scope!["example:doc:create"]));
    }

    #[test]
    fn valid_token_with_missing_scope_is_denied_by_policy() {
        let authority = authority();
        let token = token_with_scope("example:doc:read");

        let err = authority
            .verify_token::<ClaimsWithScope>(&token, &policy![scope!["example:doc:delete"]])
            .unwrap_err();

        assert!(matches!(err, AuthorityError::PolicyDenial(_)));
    }

    #[test]
    fn token_signed_by_unknown_key_is_rejected() {
        let authority = authority();

        let rogue = Jwk::from(jwa::Hmac::new(Base64Url::from_raw(b"rogue".to_vec())))
            .with_algorithm(jwa::Algorithm::HS256)
            .with_key_id(jwk::KeyId::from_static("rogue-key"));

        #[derive(serde::Serialize)]
        struct Payload<'a> {
            aud: &'a str,
            exp: u64,
            scope: &'a str,
        }

        let token = gatekey::Jwt::try_from_parts_with_signature(
            &jwt::Header::with_key_id(
                jwa::Algorithm::HS256,
                jwk::KeyId::from_static("rogue-key"),
            ),
            &Payload {
                aud: "account",
                exp: u64::MAX,
                scope: "example:doc:read",
            },
            &rogue,
        )
        .unwrap();

        let err = authority
            .verify_token::<ClaimsWithScope>(&token, &ScopePolicy::allow_any())
            .unwrap_err();

        assert!(matches!(err, AuthorityError::UnknownKeyId));
    }

    #[test]
    fn expired_token_is_rejected() {
        let authority = authority();

        #[derive(serde::Serialize)]
        struct Payload<'a> {
            aud: &'a str,
            exp: u64,
            scope: &'a str,
        }

        let token = gatekey::Jwt::try_from_parts_with_signature(
            &jwt::Header::with_key_id(jwa::Algorithm::HS256, jwk::KeyId::from_static(KEY_ID)),
            &Payload {
                aud: "account",
                exp: 10,
                scope: "example:doc:read",
            },
            &signing_key(),
        )
        .unwrap();

        let err = authority
            .verify_token::<ClaimsWithScope>(&token, &ScopePolicy::allow_any())
            .unwrap_err();

        assert!(matches!(err, AuthorityError::JwtVerifyError(_)));
    }

    #[test]
    fn token_for_wrong_audience_is_rejected() {
        let authority = authority();

        #[derive(serde::Serialize)]
        struct Payload<'a> {
            aud: &'a str,
            exp: u64,
            scope: &'a str,
        }

        let token = gatekey::Jwt::try_from_parts_with_signature(
            &jwt::Header::with_key_id(jwa::Algorithm::HS256, jwk::KeyId::from_static(KEY_ID)),
            &Payload {
                aud: "someone-else",
                exp: u64::MAX,
                scope: "example:doc:read",
            },
            &signing_key(),
        )
        .unwrap();

        let err = authority
            .verify_token::<ClaimsWithScope>(&token, &ScopePolicy::allow_any())
            .unwrap_err();

        assert!(matches!(err, AuthorityError::JwtVerifyError(_)));
    }

    #[test]
    fn replacing_the_key_set_invalidates_old_keys() {
        let authority = authority();
        let token = token_with_scope("example:doc:read");

        authority.set_jwks(Jwks::default());

        let err = authority
            .verify_token::<ClaimsWithScope>(&token, &ScopePolicy::allow_any())
            .unwrap_err();

        assert!(matches!(err, AuthorityError::UnknownKeyId));
    }
}
