//! Jittering of renewal times to avoid stampedes

use aliri_clock::UnixTime;

/// A source of jitter applied to token renewal times
pub trait JitterSource {
    /// Jitters the given time
    fn jitter(&mut self, time: UnixTime) -> UnixTime;
}

/// A jitter source that leaves times unchanged
#[derive(Debug)]
pub struct NullJitter;

impl JitterSource for NullJitter {
    #[inline]
    fn jitter(&mut self, time: UnixTime) -> UnixTime {
        time
    }
}

#[cfg(feature = "rand")]
mod random {
    use aliri_clock::{DurationSecs, UnixTime};
    use rand::{Rng, SeedableRng};

    /// Jitters a time earlier by a random amount
    ///
    /// Jittered times are uniformly distributed over
    /// `(time - max_jitter, time]`.
    #[derive(Debug)]
    pub struct RandomEarlyJitter<R> {
        max_jitter: DurationSecs,
        rand_source: R,
    }

    impl RandomEarlyJitter<rand::rngs::StdRng> {
        /// Constructs a jitter source that moves times earlier by up to
        /// `max_jitter`
        pub fn new(max_jitter: DurationSecs) -> Self {
            Self {
                max_jitter,
                rand_source: rand::rngs::StdRng::from_rng(rand::thread_rng())
                    .expect("seeding from the thread-local RNG cannot fail"),
            }
        }
    }

    impl<R: Rng> super::JitterSource for RandomEarlyJitter<R> {
        fn jitter(&mut self, time: UnixTime) -> UnixTime {
            if self.max_jitter.0 == 0 {
                return time;
            }

            let jitter = self.rand_source.gen_range(0..self.max_jitter.0);
            time - DurationSecs(jitter)
        }
    }
}

#[cfg(feature = "rand")]
pub use random::RandomEarlyJitter;

#[cfg(test)]
mod tests {
    use aliri_clock::UnixTime;

    use super::*;

    #[test]
    fn null_jitter_is_identity() {
        assert_eq!(NullJitter.jitter(UnixTime(1_000)), UnixTime(1_000));
    }

    #[cfg(feature = "rand")]
    #[test]
    fn random_jitter_never_moves_time_later() {
        use aliri_clock::DurationSecs;

        let mut jitter = RandomEarlyJitter::new(DurationSecs(60));
        for _ in 0..100 {
            let jittered = jitter.jitter(UnixTime(10_000));
            assert!(jittered <= UnixTime(10_000));
            assert!(jittered > UnixTime(10_000 - 60));
        }
    }

    #[cfg(feature = "rand")]
    #[test]
    fn zero_jitter_window_is_identity() {
        use aliri_clock::DurationSecs;

        let mut jitter = RandomEarlyJitter::new(DurationSecs(0));
        assert_eq!(jitter.jitter(UnixTime(500)), UnixTime(500));
    }
}
