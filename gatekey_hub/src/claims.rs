//! Identity claims decoded from an access token
//!
//! The token received straight from the token endpoint over an
//! authenticated channel is decoded without signature verification;
//! [`IdentityClaims`] captures the claims the hub cares about while
//! retaining the rest of the payload for persistence.

use aliri_braid::braid;
use gatekey::jwt;
use gatekey_oauth2::{Groups, HasGroups};
use serde::{Deserialize, Serialize};

/// The login name selected for an admitted user
#[braid(serde)]
pub struct Username;

/// The claims carried by an access token that identify its bearer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<jwt::Subject>,

    #[serde(default)]
    groups: Groups,

    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl IdentityClaims {
    /// The `preferred_username` claim, if present
    pub fn preferred_username(&self) -> Option<&str> {
        self.preferred_username.as_deref()
    }

    /// The `email` claim, if present
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// The `sub` claim, if present
    pub fn sub(&self) -> Option<&jwt::SubjectRef> {
        self.sub.as_deref()
    }

    /// The name the hub should register for this bearer
    ///
    /// Prefers `preferred_username`, falling back to `email` and then to
    /// the `sub` claim.
    pub fn username(&self) -> Option<&UsernameRef> {
        self.preferred_username
            .as_deref()
            .or(self.email.as_deref())
            .or_else(|| self.sub.as_deref().map(|s| s.as_str()))
            .map(UsernameRef::from_str)
    }

    /// Any other claim retained from the token payload
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.rest.get(name)
    }
}

impl HasGroups for IdentityClaims {
    #[inline]
    fn groups(&self) -> &Groups {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(json: &str) -> IdentityClaims {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn preferred_username_is_chosen_first() {
        let claims = claims(
            r#"{"preferred_username": "jdoe", "email": "jdoe@example.com", "sub": "u-123"}"#,
        );
        assert_eq!(claims.username().map(|u| u.as_str()), Some("jdoe"));
    }

    #[test]
    fn email_is_used_when_preferred_username_is_absent() {
        let claims = claims(r#"{"email": "jdoe@example.com", "sub": "u-123"}"#);
        assert_eq!(
            claims.username().map(|u| u.as_str()),
            Some("jdoe@example.com")
        );
    }

    #[test]
    fn sub_is_the_last_resort() {
        let claims = claims(r#"{"sub": "u-123"}"#);
        assert_eq!(claims.username().map(|u| u.as_str()), Some("u-123"));
    }

    #[test]
    fn anonymous_claims_produce_no_username() {
        let claims = claims(r#"{"groups": ["Staff"]}"#);
        assert!(claims.username().is_none());
    }

    #[test]
    fn missing_groups_claim_is_an_empty_set() {
        let claims = claims(r#"{"sub": "u-123"}"#);
        assert!(claims.groups().is_empty());
    }

    #[test]
    fn unrecognized_claims_survive_a_round_trip() {
        let claims = claims(r#"{"sub": "u-123", "org": "research", "exp": 1700000000}"#);
        assert_eq!(
            claims.claim("org"),
            Some(&serde_json::Value::from("research"))
        );

        let json = serde_json::to_string(&claims).unwrap();
        let restored: IdentityClaims = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.claim("org"), claims.claim("org"));
        assert_eq!(restored.claim("exp"), claims.claim("exp"));
    }
}
