//! Access policies evaluated against a bearer's grants

use std::{iter, slice, vec};

use thiserror::Error;

use crate::Scope;

/// An access control decision over some request for access
///
/// Policies are evaluated against what the bearer actually holds; a
/// denial carries the reason access was refused.
pub trait Policy {
    /// The grant evaluated by this policy
    type Request;

    /// The denial returned when the policy refuses access
    type Denial: std::error::Error;

    /// Evaluates the policy against the bearer's grant
    ///
    /// # Errors
    ///
    /// Returns a denial if the grant does not satisfy the policy.
    fn evaluate(&self, held: &Self::Request) -> Result<(), Self::Denial>;
}

/// Indicates the requester held insufficient scope to be granted access
/// to a controlled resource
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Error)]
#[error("insufficient scope")]
pub struct InsufficientScope;

/// An access policy over OAuth2 scopes
///
/// The policy is a list of alternatives: access is allowed when the
/// bearer's scope covers every scope token of at least one alternative.
/// A policy without alternatives denies all requests.
///
/// # Examples
///
/// ## Deny all requests
/// ```
/// use gatekey_oauth2::{Policy, Scope, ScopePolicy};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let policy = ScopePolicy::deny_all();
///
/// let request = Scope::single("admin".parse()?);
/// assert!(policy.evaluate(&request).is_err());
/// # Ok(())
/// # }
/// ```
///
/// ## Allow any request
/// ```
/// use gatekey_oauth2::{Policy, Scope, ScopePolicy};
///
/// let policy = ScopePolicy::allow_any();
///
/// let request = Scope::empty();
/// assert!(policy.evaluate(&request).is_ok());
/// ```
///
/// ## Require one set of scopes, with alternatives
/// ```
/// use gatekey_oauth2::{scope, Policy, ScopePolicy};
///
/// let policy = ScopePolicy::deny_all()
///     .or_allow(scope!["admin"])
///     .or_allow(scope!["special", "user"]);
///
/// assert!(policy.evaluate(&scope!["admin"]).is_ok());
/// assert!(policy.evaluate(&scope!["special", "user"]).is_ok());
/// assert!(policy.evaluate(&scope!["user"]).is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct ScopePolicy {
    inner: ScopePolicyInner,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ScopePolicyInner {
    DenyAll,
    AllowAny,
    AllowOne(Scope),
    AllowMany(Vec<Scope>),
}

impl Default for ScopePolicy {
    /// The default policy denies all requests
    #[inline]
    fn default() -> Self {
        Self::deny_all()
    }
}

impl ScopePolicy {
    /// Constructs a policy with no permissible alternatives (deny all)
    #[inline]
    pub const fn deny_all() -> Self {
        Self {
            inner: ScopePolicyInner::DenyAll,
        }
    }

    /// Constructs a policy that requires no particular scope
    #[inline]
    pub const fn allow_any() -> Self {
        Self {
            inner: ScopePolicyInner::AllowAny,
        }
    }

    /// Constructs a policy that requires this set of scope tokens
    #[inline]
    pub const fn allow_one(scope: Scope) -> Self {
        Self {
            inner: ScopePolicyInner::AllowOne(scope),
        }
    }

    /// Adds an alternative acceptable scope
    ///
    /// An empty alternative makes the policy allow any request.
    #[inline]
    pub fn or_allow(mut self, scope: Scope) -> Self {
        self.allow(scope);
        self
    }

    /// Adds an alternative acceptable scope
    pub fn allow(&mut self, scope: Scope) {
        if scope.is_empty() {
            self.inner = ScopePolicyInner::AllowAny;
            return;
        }

        let prior = std::mem::replace(&mut self.inner, ScopePolicyInner::DenyAll);
        self.inner = match prior {
            ScopePolicyInner::AllowAny => ScopePolicyInner::AllowAny,
            ScopePolicyInner::DenyAll => ScopePolicyInner::AllowOne(scope),
            ScopePolicyInner::AllowOne(existing) => {
                ScopePolicyInner::AllowMany(vec![existing, scope])
            }
            ScopePolicyInner::AllowMany(mut scopes) => {
                scopes.push(scope);
                ScopePolicyInner::AllowMany(scopes)
            }
        };
    }

    /// Constructs a policy requiring this scope, parsed from a string
    ///
    /// # Panics
    ///
    /// Panics if the provided string is not a valid [`Scope`].
    pub fn allow_one_from_static(scope: &'static str) -> Self {
        match scope.parse::<Scope>() {
            Ok(scope) => Self::allow_one(scope),
            Err(err) => panic!("{}: scope = {}", err, scope),
        }
    }

    /// Adds an alternative acceptable scope, parsed from a string
    ///
    /// # Panics
    ///
    /// Panics if the provided string is not a valid [`Scope`].
    pub fn or_allow_from_static(self, scope: &'static str) -> Self {
        match scope.parse::<Scope>() {
            Ok(scope) => self.or_allow(scope),
            Err(err) => panic!("{}: scope = {}", err, scope),
        }
    }

    const fn is_allow_all(&self) -> bool {
        matches!(self.inner, ScopePolicyInner::AllowAny)
    }
}

impl Policy for ScopePolicy {
    type Request = Scope;
    type Denial = InsufficientScope;

    fn evaluate(&self, held: &Self::Request) -> Result<(), Self::Denial> {
        let allowed = self.into_iter().any(|alt| held.contains_all(alt));

        if allowed {
            Ok(())
        } else {
            Err(InsufficientScope)
        }
    }
}

impl IntoIterator for ScopePolicy {
    type Item = Scope;
    type IntoIter = IntoIter;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        let inner = match self.inner {
            ScopePolicyInner::DenyAll => IntoIterInner::Empty,
            ScopePolicyInner::AllowAny => IntoIterInner::One(iter::once(Scope::empty())),
            ScopePolicyInner::AllowOne(scope) => IntoIterInner::One(iter::once(scope)),
            ScopePolicyInner::AllowMany(scopes) => IntoIterInner::Many(scopes.into_iter()),
        };
        IntoIter { inner }
    }
}

/// An iterator over the scope alternatives in a [`ScopePolicy`]
#[derive(Debug)]
pub struct IntoIter {
    inner: IntoIterInner,
}

#[derive(Debug)]
enum IntoIterInner {
    Empty,
    One(iter::Once<Scope>),
    Many(vec::IntoIter<Scope>),
}

impl Iterator for IntoIter {
    type Item = Scope;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IntoIterInner::Empty => None,
            IntoIterInner::One(iter) => iter.next(),
            IntoIterInner::Many(iter) => iter.next(),
        }
    }
}

/// An iterator over borrowed scope alternatives
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    inner: IterInner<'a>,
}

#[derive(Clone, Debug)]
enum IterInner<'a> {
    Empty,
    One(iter::Once<&'a Scope>),
    Many(slice::Iter<'a, Scope>),
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Scope;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Empty => None,
            IterInner::One(iter) => iter.next(),
            IterInner::Many(iter) => iter.next(),
        }
    }
}

impl<'a> IntoIterator for &'a ScopePolicy {
    type Item = &'a Scope;
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        static EMPTY_SCOPE: once_cell::sync::Lazy<Scope> = once_cell::sync::Lazy::new(Scope::empty);

        Iter {
            inner: match &self.inner {
                ScopePolicyInner::DenyAll => IterInner::Empty,
                ScopePolicyInner::AllowAny => IterInner::One(iter::once(&*EMPTY_SCOPE)),
                ScopePolicyInner::AllowOne(scope) => IterInner::One(iter::once(scope)),
                ScopePolicyInner::AllowMany(scopes) => IterInner::Many(scopes.iter()),
            },
        }
    }
}

impl Extend<Scope> for ScopePolicy {
    #[inline]
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = Scope>,
    {
        for scope in iter {
            self.allow(scope);

            if self.is_allow_all() {
                break;
            }
        }
    }
}

impl iter::FromIterator<Scope> for ScopePolicy {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Scope>,
    {
        let mut policy = Self::deny_all();
        policy.extend(iter);
        policy
    }
}

impl From<Scope> for ScopePolicy {
    #[inline]
    fn from(scope: Scope) -> Self {
        Self::allow_one(scope)
    }
}

/// Constructs a [`ScopePolicy`] from a list of scope alternatives
///
/// ```
/// use gatekey_oauth2::{policy, scope};
///
/// let policy = policy![
///     scope!["admin"],
///     scope!["special", "user"],
/// ];
/// ```
///
/// This is equivalent to:
///
/// ```
/// use gatekey_oauth2::{scope, ScopePolicy};
///
/// let policy = ScopePolicy::deny_all()
///     .or_allow(scope!["admin"])
///     .or_allow(scope!["special", "user"]);
/// ```
#[macro_export]
macro_rules! policy {
    ($($scope:expr),* $(,)?) => {
        $crate::ScopePolicy::deny_all()
        $(
            .or_allow($scope)
        )*
    };
}
