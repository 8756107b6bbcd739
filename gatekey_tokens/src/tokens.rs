use aliri_clock::{Clock, DurationSecs, System, UnixTime};
use serde::{Deserialize, Serialize};

use crate::{AccessTokenRef, IdTokenRef};

/// A token as returned by the authority, annotated with lifetime
/// information
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenWithLifetime {
    access_token: Box<AccessTokenRef>,
    id_token: Option<Box<IdTokenRef>>,
    lifetime: DurationSecs,
    issued: UnixTime,
    stale: UnixTime,
    expiry: UnixTime,
}

impl TokenWithLifetime {
    pub(crate) fn clone_it(&self) -> Self {
        Self {
            access_token: self.access_token.to_owned().into_boxed_ref(),
            id_token: self
                .id_token
                .as_deref()
                .map(|x| (*x).to_owned().into_boxed_ref()),
            lifetime: self.lifetime,
            issued: self.issued,
            stale: self.stale,
            expiry: self.expiry,
        }
    }
}

/// A token's lifecycle status
#[derive(Debug)]
pub enum TokenStatus {
    /// The token is fresh and valid
    Fresh,
    /// The token is valid, but should be refreshed
    Stale,
    /// The token is no longer valid
    Expired,
}

impl TokenWithLifetime {
    /// The current access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// The current ID token, if available
    #[inline]
    pub fn id_token(&self) -> Option<&IdTokenRef> {
        self.id_token.as_deref()
    }

    /// The token's lifetime
    #[inline]
    pub fn lifetime(&self) -> DurationSecs {
        self.lifetime
    }

    /// The time the token was issued
    #[inline]
    pub fn issued(&self) -> UnixTime {
        self.issued
    }

    /// The time the token will become stale
    #[inline]
    pub fn stale(&self) -> UnixTime {
        self.stale
    }

    /// The time the token will expire
    #[inline]
    pub fn expiry(&self) -> UnixTime {
        self.expiry
    }

    /// The token's current lifetime status
    #[inline]
    pub fn token_status(&self) -> TokenStatus {
        self.token_status_with_clock(&System)
    }

    /// The token's lifetime status based on the time reported by the
    /// provided clock
    #[inline]
    pub fn token_status_with_clock<C: Clock>(&self, clock: &C) -> TokenStatus {
        self.token_status_at(clock.now())
    }

    /// The token's lifetime status as of the provided time
    #[inline]
    pub fn token_status_at(&self, time: UnixTime) -> TokenStatus {
        if time < self.stale {
            TokenStatus::Fresh
        } else if time < self.expiry {
            TokenStatus::Stale
        } else {
            TokenStatus::Expired
        }
    }

    /// How much longer the token will be fresh
    #[inline]
    pub fn until_stale(&self) -> DurationSecs {
        self.until_stale_at(System.now())
    }

    /// How much longer the token would be fresh as of the provided time
    #[inline]
    pub fn until_stale_at(&self, time: UnixTime) -> DurationSecs {
        if time < self.stale {
            self.stale - time
        } else {
            DurationSecs(0)
        }
    }

    /// How much longer the token will be valid
    #[inline]
    pub fn until_expired(&self) -> DurationSecs {
        self.until_expired_at(System.now())
    }

    /// How much longer the token would be valid as of the provided time
    #[inline]
    pub fn until_expired_at(&self, time: UnixTime) -> DurationSecs {
        if time < self.expiry {
            self.expiry - time
        } else {
            DurationSecs(0)
        }
    }
}

/// Determines when a token should be considered stale
///
/// A token becomes stale once `freshness_period` (a ratio of the token's
/// lifetime) has elapsed, but never sooner than `min_staleness_period`
/// after issuance.
#[derive(Clone, Debug)]
pub struct TokenLifetimeConfig<C = System> {
    freshness_period: f64,
    min_staleness_period: DurationSecs,
    clock: C,
}

impl Default for TokenLifetimeConfig {
    /// A freshness period of 75% with a minimum staleness period of 30
    /// seconds, measured against the system clock
    fn default() -> Self {
        Self {
            freshness_period: 0.75,
            min_staleness_period: DurationSecs(30),
            clock: System,
        }
    }
}

impl TokenLifetimeConfig {
    /// Constructs a lifetime configuration with the given freshness
    /// ratio and minimum staleness period
    pub fn new(freshness_period: f64, min_staleness_period: DurationSecs) -> Self {
        Self {
            freshness_period,
            min_staleness_period,
            clock: System,
        }
    }
}

impl<C> TokenLifetimeConfig<C> {
    /// Replaces the clock used to stamp token lifetimes
    ///
    /// Useful for testing.
    pub fn with_clock<D>(self, clock: D) -> TokenLifetimeConfig<D> {
        TokenLifetimeConfig {
            freshness_period: self.freshness_period,
            min_staleness_period: self.min_staleness_period,
            clock,
        }
    }

    fn time_to_stale(&self, issued: UnixTime, valid_duration: DurationSecs) -> UnixTime {
        let delay = (valid_duration * self.freshness_period).max(self.min_staleness_period);
        issued + delay
    }
}

impl<C: Clock> TokenLifetimeConfig<C> {
    /// Stamps an access token (and optional ID token) with lifetime
    /// information relative to this configuration's clock
    pub fn create_token<A, I>(
        &self,
        access_token: A,
        id_token: Option<I>,
        valid_duration: DurationSecs,
    ) -> TokenWithLifetime
    where
        A: AsRef<AccessTokenRef>,
        I: AsRef<IdTokenRef>,
    {
        let issued = self.clock.now();
        TokenWithLifetime {
            access_token: access_token.as_ref().to_owned().into_boxed_ref(),
            id_token: id_token.map(|i| i.as_ref().to_owned().into_boxed_ref()),
            lifetime: valid_duration,
            issued,
            stale: self.time_to_stale(issued, valid_duration),
            expiry: issued + valid_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use aliri_clock::TestClock;

    use super::*;
    use crate::{AccessToken, IdToken};

    fn stamped(clock_at: u64, lifetime: u64) -> TokenWithLifetime {
        TokenLifetimeConfig::default()
            .with_clock(TestClock::new(UnixTime(clock_at)))
            .create_token(
                AccessToken::from_static("token"),
                None::<IdToken>,
                DurationSecs(lifetime),
            )
    }

    #[test]
    fn staleness_is_a_fraction_of_the_lifetime() {
        let token = stamped(1_000, 400);
        assert_eq!(token.issued(), UnixTime(1_000));
        assert_eq!(token.stale(), UnixTime(1_300));
        assert_eq!(token.expiry(), UnixTime(1_400));
    }

    #[test]
    fn minimum_staleness_period_is_honored() {
        let token = stamped(1_000, 20);
        assert_eq!(token.stale(), UnixTime(1_030));
    }

    #[test]
    fn status_progresses_over_time() {
        let token = stamped(1_000, 400);

        assert!(matches!(
            token.token_status_at(UnixTime(1_100)),
            TokenStatus::Fresh
        ));
        assert!(matches!(
            token.token_status_at(UnixTime(1_350)),
            TokenStatus::Stale
        ));
        assert!(matches!(
            token.token_status_at(UnixTime(1_400)),
            TokenStatus::Expired
        ));
    }

    #[test]
    fn remaining_durations_clamp_to_zero() {
        let token = stamped(1_000, 400);

        assert_eq!(token.until_stale_at(UnixTime(1_100)), DurationSecs(200));
        assert_eq!(token.until_stale_at(UnixTime(2_000)), DurationSecs(0));
        assert_eq!(token.until_expired_at(UnixTime(1_399)), DurationSecs(1));
        assert_eq!(token.until_expired_at(UnixTime(2_000)), DurationSecs(0));
    }

    #[test]
    fn round_trips_through_serde() {
        let token = stamped(1_000, 400);
        let json = serde_json::to_string(&token).unwrap();
        let restored: TokenWithLifetime = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.access_token().as_str(), "token");
        assert_eq!(restored.stale(), token.stale());
    }
}
