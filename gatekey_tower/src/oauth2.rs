use std::{fmt, marker::PhantomData};

use gatekey_oauth2::{
    GroupPolicy, HasGroups, HasScope, NotInAllowedGroup, Policy, ScopePolicy,
};
use http::{Request, Response};
use tower_http::validate_request::ValidateRequest;

use crate::{
    util::{forbidden, unauthorized},
    TerseErrorHandler, VerboseErrorHandler,
};

pub(crate) struct VerifyScope<Claims, OnError> {
    policy: ScopePolicy,
    on_error: OnError,
    _claim: PhantomData<fn() -> Claims>,
}

impl<Claims, OnError> Clone for VerifyScope<Claims, OnError>
where
    OnError: Clone,
{
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            on_error: self.on_error.clone(),
            _claim: PhantomData,
        }
    }
}

impl<Claims, OnError> fmt::Debug for VerifyScope<Claims, OnError>
where
    OnError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VerifyScope")
            .field("policy", &self.policy)
            .field("on_error", &self.on_error)
            .finish()
    }
}

impl<Claims, OnError> VerifyScope<Claims, OnError> {
    #[inline]
    pub(crate) fn new(policy: ScopePolicy, on_error: OnError) -> Self {
        Self {
            policy,
            on_error,
            _claim: PhantomData,
        }
    }
}

impl<Claims, OnError, ReqBody> ValidateRequest<ReqBody> for VerifyScope<Claims, OnError>
where
    OnError: OnScopeError,
    OnError::Body: Default,
    Claims: HasScope + Send + Sync + 'static,
{
    type ResponseBody = OnError::Body;

    fn validate(
        &mut self,
        request: &mut Request<ReqBody>,
    ) -> Result<(), Response<Self::ResponseBody>> {
        let scope = request
            .extensions()
            .get::<Claims>()
            .map(|c| c.scope())
            .ok_or_else(|| self.on_error.on_missing_scope_claim())?;

        tracing::trace!(?scope, policy = ?self.policy, "evaluating scope policy");

        self.policy
            .evaluate(scope)
            .map_err(|_| self.on_error.on_scope_policy_failure(&self.policy))?;

        Ok(())
    }
}

/// Handler for responding to failures while enforcing a scope policy
pub trait OnScopeError {
    /// The body type returned on an error
    type Body;

    /// Response when the expected claims are not attached to the request
    ///
    /// This generally means the JWT layer did not run ahead of the scope
    /// layer.
    fn on_missing_scope_claim(&self) -> Response<Self::Body>;

    /// Response when the granted scope does not satisfy the policy
    fn on_scope_policy_failure(&self, policy: &ScopePolicy) -> Response<Self::Body>;
}

impl<ResBody> OnScopeError for TerseErrorHandler<ResBody>
where
    ResBody: Default,
{
    type Body = ResBody;

    #[inline]
    fn on_missing_scope_claim(&self) -> Response<Self::Body> {
        tracing::debug!("scope enforcement failed: no claims attached to the request");
        unauthorized("")
    }

    #[inline]
    fn on_scope_policy_failure(&self, _: &ScopePolicy) -> Response<Self::Body> {
        tracing::debug!("scope enforcement failed: insufficient scope");
        forbidden("", None)
    }
}

impl<ResBody> OnScopeError for VerboseErrorHandler<ResBody>
where
    ResBody: Default,
{
    type Body = ResBody;

    #[inline]
    fn on_missing_scope_claim(&self) -> Response<Self::Body> {
        let message = "no claims attached to the request";
        tracing::debug!("scope enforcement failed: {message}");
        unauthorized(message)
    }

    #[inline]
    fn on_scope_policy_failure(&self, policy: &ScopePolicy) -> Response<Self::Body> {
        let message = "insufficient scope";
        tracing::debug!("scope enforcement failed: {message}");
        forbidden(message, Some(policy))
    }
}

pub(crate) struct VerifyGroups<Claims, OnError> {
    policy: GroupPolicy,
    on_error: OnError,
    _claim: PhantomData<fn() -> Claims>,
}

impl<Claims, OnError> Clone for VerifyGroups<Claims, OnError>
where
    OnError: Clone,
{
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            on_error: self.on_error.clone(),
            _claim: PhantomData,
        }
    }
}

impl<Claims, OnError> fmt::Debug for VerifyGroups<Claims, OnError>
where
    OnError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VerifyGroups")
            .field("policy", &self.policy)
            .field("on_error", &self.on_error)
            .finish()
    }
}

impl<Claims, OnError> VerifyGroups<Claims, OnError> {
    #[inline]
    pub(crate) fn new(policy: GroupPolicy, on_error: OnError) -> Self {
        Self {
            policy,
            on_error,
            _claim: PhantomData,
        }
    }
}

impl<Claims, OnError, ReqBody> ValidateRequest<ReqBody> for VerifyGroups<Claims, OnError>
where
    OnError: OnGroupError,
    OnError::Body: Default,
    Claims: HasGroups + Send + Sync + 'static,
{
    type ResponseBody = OnError::Body;

    fn validate(
        &mut self,
        request: &mut Request<ReqBody>,
    ) -> Result<(), Response<Self::ResponseBody>> {
        let groups = request
            .extensions()
            .get::<Claims>()
            .map(|c| c.groups())
            .ok_or_else(|| self.on_error.on_missing_groups_claim())?;

        tracing::trace!(?groups, policy = ?self.policy, "evaluating group policy");

        self.policy
            .evaluate(groups)
            .map_err(|err| self.on_error.on_group_policy_failure(err))?;

        Ok(())
    }
}

/// Handler for responding to failures while enforcing a group policy
pub trait OnGroupError {
    /// The body type returned on an error
    type Body;

    /// Response when the expected claims are not attached to the request
    fn on_missing_groups_claim(&self) -> Response<Self::Body>;

    /// Response when the bearer belongs to none of the allowed groups
    fn on_group_policy_failure(&self, error: NotInAllowedGroup) -> Response<Self::Body>;
}

impl<ResBody> OnGroupError for TerseErrorHandler<ResBody>
where
    ResBody: Default,
{
    type Body = ResBody;

    #[inline]
    fn on_missing_groups_claim(&self) -> Response<Self::Body> {
        tracing::debug!("group enforcement failed: no claims attached to the request");
        unauthorized("")
    }

    #[inline]
    fn on_group_policy_failure(&self, _: NotInAllowedGroup) -> Response<Self::Body> {
        tracing::debug!("group enforcement failed: bearer not in an allowed group");
        forbidden("", None)
    }
}

impl<ResBody> OnGroupError for VerboseErrorHandler<ResBody>
where
    ResBody: Default,
{
    type Body = ResBody;

    #[inline]
    fn on_missing_groups_claim(&self) -> Response<Self::Body> {
        let message = "no claims attached to the request";
        tracing::debug!("group enforcement failed: {message}");
        unauthorized(message)
    }

    #[inline]
    fn on_group_policy_failure(&self, error: NotInAllowedGroup) -> Response<Self::Body> {
        tracing::debug!("group enforcement failed: {error}");
        forbidden(&error.to_string(), None)
    }
}
