use std::{fmt, marker::PhantomData};

use gatekey::jwt::RegisteredClaims;
use gatekey_oauth2::{
    scope::ClaimsWithScope, Authority, GroupPolicy, HasGroups, HasScope, ScopePolicy,
};
use http_body::Body;
use tower_http::validate_request::{ValidateRequest, ValidateRequestHeaderLayer};

use crate::{
    jwt::VerifyJwt,
    oauth2::{VerifyGroups, VerifyScope},
    OnGroupError, OnJwtError, OnScopeError, TerseErrorHandler, VerboseErrorHandler,
};

/// Builder for layers that authenticate JWTs and authorize access based
/// on scope or group grants
pub struct Oauth2Authorizer<Claims, OnError> {
    on_error: OnError,
    _claim: PhantomData<fn() -> Claims>,
}

impl<Claims, OnError> Clone for Oauth2Authorizer<Claims, OnError>
where
    OnError: Clone,
{
    fn clone(&self) -> Self {
        Self {
            on_error: self.on_error.clone(),
            _claim: PhantomData,
        }
    }
}

impl<Claims, OnError> Copy for Oauth2Authorizer<Claims, OnError> where OnError: Copy {}

impl<Claims, OnError> fmt::Debug for Oauth2Authorizer<Claims, OnError>
where
    OnError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Oauth2Authorizer")
            .field("on_error", &self.on_error)
            .finish()
    }
}

impl Oauth2Authorizer<ClaimsWithScope, ()> {
    /// Constructs a new authorizer builder
    #[inline]
    pub fn new() -> Oauth2Authorizer<ClaimsWithScope, ()> {
        Self {
            on_error: (),
            _claim: PhantomData,
        }
    }
}

impl Default for Oauth2Authorizer<ClaimsWithScope, ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<OnError> Oauth2Authorizer<ClaimsWithScope, OnError> {
    /// Verification will expect the given custom claims object in the
    /// request extensions
    #[inline]
    pub fn with_claims<Claims: HasScope>(self) -> Oauth2Authorizer<Claims, OnError> {
        Oauth2Authorizer {
            on_error: self.on_error,
            _claim: PhantomData,
        }
    }
}

impl<Claims> Oauth2Authorizer<Claims, ()> {
    /// Attaches a custom error handler to generate responses in the
    /// event of a verification failure
    #[inline]
    pub fn with_error_handler<OnError>(
        self,
        on_error: OnError,
    ) -> Oauth2Authorizer<Claims, OnError> {
        Oauth2Authorizer {
            on_error,
            _claim: self._claim,
        }
    }

    /// Attaches the default terse error handler: [`TerseErrorHandler`]
    ///
    /// Error responses carry the relevant status code with an empty body.
    #[inline]
    pub fn with_terse_error_handler<ResBody: Body + Default>(
        self,
    ) -> Oauth2Authorizer<Claims, TerseErrorHandler<ResBody>> {
        Oauth2Authorizer {
            on_error: TerseErrorHandler::new(),
            _claim: self._claim,
        }
    }

    /// Attaches the default verbose error handler: [`VerboseErrorHandler`]
    ///
    /// Error responses carry the relevant status code along with a
    /// description of the failure in the `www-authenticate` challenge.
    #[inline]
    pub fn with_verbose_error_handler<ResBody: Body + Default>(
        self,
    ) -> Oauth2Authorizer<Claims, VerboseErrorHandler<ResBody>> {
        Oauth2Authorizer {
            on_error: VerboseErrorHandler::new(),
            _claim: self._claim,
        }
    }
}

impl<Claims, OnError> Oauth2Authorizer<Claims, OnError>
where
    OnError: OnJwtError + Clone,
    OnError::Body: Body + Default,
    Claims: for<'de> serde::Deserialize<'de>
        + HasScope
        + RegisteredClaims
        + Clone
        + Send
        + Sync
        + 'static,
{
    /// Authorizer layer that verifies the validity of a JWT
    ///
    /// The JWT is read from the request's `Authorization` header and
    /// checked for validity by the [`Authority`]. The extracted `Claims`
    /// are made available through
    /// [`Request::extensions`][http::Request::extensions].
    pub fn jwt_layer<ReqBody>(
        &self,
        authority: Authority,
    ) -> ValidateRequestHeaderLayer<
        impl ValidateRequest<ReqBody, ResponseBody = OnError::Body> + Clone,
    > {
        ValidateRequestHeaderLayer::custom(VerifyJwt::<Claims, _>::new(
            authority,
            self.on_error.clone(),
        ))
    }
}

impl<Claims, OnError> Oauth2Authorizer<Claims, OnError>
where
    OnError: OnScopeError + Clone,
    OnError::Body: Body + Default,
    Claims: HasScope + Send + Sync + 'static,
{
    /// Authorizer layer that checks the access granted by a scope claim
    /// against a scope policy
    ///
    /// The `Claims` object is expected to have already been added to the
    /// [`Request::extensions`][http::Request::extensions], generally by
    /// the [`jwt_layer`][Self::jwt_layer] running ahead of this layer.
    pub fn scope_layer<ReqBody>(
        &self,
        policy: ScopePolicy,
    ) -> ValidateRequestHeaderLayer<
        impl ValidateRequest<ReqBody, ResponseBody = OnError::Body> + Clone,
    > {
        ValidateRequestHeaderLayer::custom(VerifyScope::<Claims, _>::new(
            policy,
            self.on_error.clone(),
        ))
    }
}

impl<Claims, OnError> Oauth2Authorizer<Claims, OnError>
where
    OnError: OnGroupError + Clone,
    OnError::Body: Body + Default,
    Claims: HasGroups + Send + Sync + 'static,
{
    /// Authorizer layer that admits bearers belonging to any one of a
    /// policy's allowed groups
    ///
    /// The `Claims` object is expected to have already been added to the
    /// [`Request::extensions`][http::Request::extensions], generally by
    /// the [`jwt_layer`][Self::jwt_layer] running ahead of this layer.
    pub fn group_layer<ReqBody>(
        &self,
        policy: GroupPolicy,
    ) -> ValidateRequestHeaderLayer<
        impl ValidateRequest<ReqBody, ResponseBody = OnError::Body> + Clone,
    > {
        ValidateRequestHeaderLayer::custom(VerifyGroups::<Claims, _>::new(
            policy,
            self.on_error.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use aliri_base64::Base64Url;
    use gatekey::{jwa, jwk, jwt, Jwk, Jwks};
    use gatekey_oauth2::{policy, scope, Groups};
    use http::{header, Request, StatusCode};

    use super::*;

    #[derive(Clone, Debug, serde::Deserialize)]
    struct TestClaims {
        #[serde(flatten)]
        claims: jwt::Claims,
        #[serde(default)]
        scope: gatekey_oauth2::Scope,
        #[serde(default)]
        groups: Groups,
    }

    impl jwt::RegisteredClaims for TestClaims {
        fn nbf(&self) -> Option<aliri_clock::UnixTime> {
            self.claims.nbf()
        }
        fn exp(&self) -> Option<aliri_clock::UnixTime> {
            self.claims.exp()
        }
        fn aud(&self) -> &jwt::Audiences {
            self.claims.aud()
        }
        fn iss(&self) -> Option<&jwt::IssuerRef> {
            self.claims.iss()
        }
        fn sub(&self) -> Option<&jwt::SubjectRef> {
            self.claims.sub()
        }
    }

    impl HasScope for TestClaims {
        fn scope(&self) -> &gatekey_oauth2::Scope {
            &self.scope
        }
    }

    impl HasGroups for TestClaims {
        fn groups(&self) -> &Groups {
            &self.groups
        }
    }

    fn signing_key() -> Jwk {
        Jwk::from(jwa::Hmac::new(Base64Url::from_raw(b"secret".to_vec())))
            .with_algorithm(jwa::Algorithm::HS256)
            .with_key_id(jwk::KeyId::from_static("test"))
    }

    fn authority() -> Authority {
        let mut jwks = Jwks::default();
        jwks.add_key(signing_key());

        Authority::new(
            jwks,
            jwt::TokenValidator::default()
                .add_approved_algorithm(jwa::Algorithm::HS256)
                .add_allowed_audience(jwt::Audience::from_static("account")),
        )
    }

    fn token(scope: &str, groups: &[&str]) -> gatekey::Jwt {
        #[derive(serde::Serialize)]
        struct Payload<'a> {
            aud: &'a str,
            exp: u64,
            scope: &'a str,
            groups: &'a [&'a str],
        }

        gatekey::Jwt::try_from_parts_with_signature(
            &jwt::Header::with_key_id(jwa::Algorithm::HS256, jwk::KeyId::from_static("test")),
            &Payload {
                aud: "account",
                exp: aliri_clock::Clock::now(&aliri_clock::System).0 + 300,
                scope,
                groups,
            },
            &signing_key(),
        )
        .unwrap()
    }

    fn jwt_verifier() -> VerifyJwt<TestClaims, TerseErrorHandler<String>> {
        VerifyJwt::new(authority(), TerseErrorHandler::new())
    }

    fn authed_request(scope: &str, groups: &[&str]) -> Request<()> {
        let mut request = Request::builder()
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", token(scope, groups).as_str()),
            )
            .body(())
            .unwrap();

        jwt_verifier()
            .validate(&mut request)
            .expect("token should validate");

        request
    }

    #[test]
    fn missing_token_is_unauthorized() {
        let mut request = Request::builder().body(()).unwrap();

        let resp = jwt_verifier().validate(&mut request).unwrap_err();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn garbage_token_is_unauthorized() {
        let mut request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(())
            .unwrap();

        let resp = jwt_verifier().validate(&mut request).unwrap_err();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn valid_token_attaches_claims() {
        let request = authed_request("example:doc:read", &["Staff"]);

        let claims = request.extensions().get::<TestClaims>().unwrap();
        assert!(claims.scope.contains_all(&scope!["example:doc:read"]));
    }

    #[test]
    fn satisfied_scope_policy_allows_the_request() {
        let mut request = authed_request("example:doc:read example:doc:create", &[]);

        let mut verifier: VerifyScope<TestClaims, _> = VerifyScope::new(
            policy![scope!["example:doc:read"]],
            TerseErrorHandler::<String>::new(),
        );

        assert!(verifier.validate(&mut request).is_ok());
    }

    #[test]
    fn unsatisfied_scope_policy_is_forbidden() {
        let mut request = authed_request("example:doc:read", &[]);

        let mut verifier: VerifyScope<TestClaims, _> = VerifyScope::new(
            policy![scope!["example:doc:delete"]],
            TerseErrorHandler::<String>::new(),
        );

        let resp = verifier.validate(&mut request).unwrap_err();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn scope_check_without_claims_is_unauthorized() {
        let mut request = Request::builder().body(()).unwrap();

        let mut verifier: VerifyScope<TestClaims, _> = VerifyScope::new(
            policy![scope!["example:doc:read"]],
            TerseErrorHandler::<String>::new(),
        );

        let resp = verifier.validate(&mut request).unwrap_err();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn allowed_group_membership_admits_the_request() {
        let mut request = authed_request("", &["HubEditor", "Staff"]);

        let mut verifier: VerifyGroups<TestClaims, _> = VerifyGroups::new(
            GroupPolicy::any_of(vec!["HubAdmin", "HubEditor"]),
            TerseErrorHandler::<String>::new(),
        );

        assert!(verifier.validate(&mut request).is_ok());
    }

    #[test]
    fn disjoint_groups_are_forbidden() {
        let mut request = authed_request("", &["Staff"]);

        let mut verifier: VerifyGroups<TestClaims, _> = VerifyGroups::new(
            GroupPolicy::any_of(vec!["HubAdmin", "HubEditor"]),
            TerseErrorHandler::<String>::new(),
        );

        let resp = verifier.validate(&mut request).unwrap_err();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
