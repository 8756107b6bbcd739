//! Group-based authorization
//!
//! Identity providers commonly attach a `groups` claim listing the
//! directory groups a bearer belongs to. Unlike scopes, where a policy
//! alternative may demand several tokens at once, group admission is
//! one-of-many: membership in any single allowed group suffices.

use std::{collections::hash_set, iter::FromIterator};

use ahash::AHashSet;
use aliri_braid::braid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Policy;

/// The name of a group asserted by an identity provider
#[braid(serde, ref_doc = "A borrowed reference to a [`Group`] name")]
pub struct Group;

/// The set of groups a bearer belongs to, as carried by a `groups` claim
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Groups(AHashSet<Group>);

impl Groups {
    /// Produces an empty group set
    #[inline]
    pub fn empty() -> Self {
        Self(AHashSet::new())
    }

    /// Adds a group to the set
    #[inline]
    pub fn insert(&mut self, group: Group) {
        self.0.insert(group);
    }

    /// Whether the bearer belongs to no groups
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the bearer belongs to the named group
    #[inline]
    #[must_use]
    pub fn contains(&self, group: &GroupRef) -> bool {
        self.0.contains(group)
    }

    /// Produces an iterator over the groups in this set
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &GroupRef> {
        self.into_iter()
    }
}

impl<G> FromIterator<G> for Groups
where
    G: Into<Group>,
{
    #[inline]
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = G>,
    {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<G> Extend<G> for Groups
where
    G: Into<Group>,
{
    #[inline]
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = G>,
    {
        self.0.extend(iter.into_iter().map(Into::into))
    }
}

/// An iterator over a set of borrowed group names
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    iter: hash_set::Iter<'a, Group>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a GroupRef;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|x| x.as_ref())
    }
}

impl<'a> IntoIterator for &'a Groups {
    type Item = &'a GroupRef;
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        Self::IntoIter {
            iter: self.0.iter(),
        }
    }
}

/// Indicates that the type carries a `groups` claim
pub trait HasGroups {
    /// The groups the underlying bearer belongs to
    fn groups(&self) -> &Groups;
}

impl HasGroups for Groups {
    #[inline]
    fn groups(&self) -> &Groups {
        self
    }
}

/// Indicates that the bearer belongs to none of the allowed groups
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Error)]
#[error("bearer is not a member of any allowed group")]
pub struct NotInAllowedGroup;

/// An admission policy over directory groups
///
/// A bearer is admitted when they belong to at least one of the allowed
/// groups. A policy constructed from an empty allow-list imposes no
/// group restriction at all, so that deployments which do not use group
/// gating are not silently locked out.
///
/// ```
/// use gatekey_oauth2::{Group, GroupPolicy, Groups, Policy};
///
/// let policy = GroupPolicy::any_of(vec![
///     Group::from_static("HubAdmin"),
///     Group::from_static("HubEditor"),
/// ]);
///
/// let member: Groups = ["HubEditor", "Staff"].into_iter().collect();
/// assert!(policy.evaluate(&member).is_ok());
///
/// let outsider: Groups = ["Staff"].into_iter().collect();
/// assert!(policy.evaluate(&outsider).is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct GroupPolicy {
    inner: GroupPolicyInner,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum GroupPolicyInner {
    AllowAny,
    AnyOf(AHashSet<Group>),
}

impl GroupPolicy {
    /// Constructs a policy that imposes no group restriction
    #[inline]
    pub fn allow_any() -> Self {
        Self {
            inner: GroupPolicyInner::AllowAny,
        }
    }

    /// Constructs a policy admitting members of any one of the given
    /// groups
    ///
    /// An empty list is equivalent to [`allow_any()`][Self::allow_any].
    pub fn any_of<I, G>(allowed: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<Group>,
    {
        let allowed: AHashSet<Group> = allowed.into_iter().map(Into::into).collect();

        if allowed.is_empty() {
            tracing::debug!("group policy constructed without any groups; no restriction applied");
            Self::allow_any()
        } else {
            Self {
                inner: GroupPolicyInner::AnyOf(allowed),
            }
        }
    }

    /// Whether this policy admits everyone
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        matches!(self.inner, GroupPolicyInner::AllowAny)
    }

    /// Produces an iterator over the allowed groups, if restricted
    pub fn allowed(&self) -> impl Iterator<Item = &GroupRef> {
        let allowed = match &self.inner {
            GroupPolicyInner::AllowAny => None,
            GroupPolicyInner::AnyOf(allowed) => Some(allowed.iter().map(AsRef::as_ref)),
        };
        allowed.into_iter().flatten()
    }
}

impl Default for GroupPolicy {
    /// The default policy imposes no group restriction
    #[inline]
    fn default() -> Self {
        Self::allow_any()
    }
}

impl Policy for GroupPolicy {
    type Request = Groups;
    type Denial = NotInAllowedGroup;

    fn evaluate(&self, held: &Self::Request) -> Result<(), Self::Denial> {
        match &self.inner {
            GroupPolicyInner::AllowAny => Ok(()),
            GroupPolicyInner::AnyOf(allowed) => {
                if held.iter().any(|g| allowed.contains(g)) {
                    Ok(())
                } else {
                    Err(NotInAllowedGroup)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> GroupPolicy {
        GroupPolicy::any_of(vec!["HubAdmin", "HubEditor"])
    }

    #[test]
    fn member_of_one_allowed_group_is_admitted() {
        let groups: Groups = ["HubEditor"].into_iter().collect();
        assert!(allowed().evaluate(&groups).is_ok());
    }

    #[test]
    fn membership_in_all_groups_is_not_required() {
        let groups: Groups = ["HubAdmin", "Unrelated"].into_iter().collect();
        assert!(allowed().evaluate(&groups).is_ok());
    }

    #[test]
    fn disjoint_groups_are_denied() {
        let groups: Groups = ["Staff", "Users"].into_iter().collect();
        assert_eq!(allowed().evaluate(&groups), Err(NotInAllowedGroup));
    }

    #[test]
    fn bearer_without_groups_is_denied() {
        assert!(allowed().evaluate(&Groups::empty()).is_err());
    }

    #[test]
    fn empty_allow_list_imposes_no_restriction() {
        let policy = GroupPolicy::any_of(Vec::<Group>::new());
        assert!(policy.is_unrestricted());
        assert!(policy.evaluate(&Groups::empty()).is_ok());
    }

    #[test]
    fn groups_claim_deserializes_from_array() {
        let groups: Groups = serde_json::from_str(r#"["HubAdmin", "Staff"]"#).unwrap();
        assert!(groups.contains(GroupRef::from_str("HubAdmin")));
        assert!(!groups.contains(GroupRef::from_str("HubEditor")));
    }
}
