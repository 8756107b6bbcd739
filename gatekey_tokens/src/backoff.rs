//! Backoff handling for errors from the token authority

use std::time::Duration;

/// Configuration for backoff when the authority reports errors
#[derive(Debug)]
pub struct ErrorBackoffConfig {
    initial_error_delay: Duration,
    max_error_delay: Duration,
    multiplier: u64,
}

impl Default for ErrorBackoffConfig {
    /// An initial delay of 100 ms doubling on each failure, capped at
    /// 15 seconds
    fn default() -> Self {
        Self {
            initial_error_delay: Duration::from_millis(100),
            max_error_delay: Duration::from_secs(15),
            multiplier: 2,
        }
    }
}

impl ErrorBackoffConfig {
    /// Constructs a new backoff configuration
    ///
    /// The first failure delays by `initial_error_delay`; each
    /// subsequent failure multiplies the delay by `multiplier`, up to
    /// `max_error_delay`.
    pub fn new(initial_error_delay: Duration, max_error_delay: Duration, multiplier: u64) -> Self {
        Self {
            initial_error_delay,
            max_error_delay,
            multiplier,
        }
    }
}

/// Extends fallible results with backoff tracking
pub trait WithBackoff {
    /// The result annotated with a backoff delay on failure
    type Output;

    /// Feeds the outcome into the backoff handler
    fn with_backoff(self, handler: &mut ErrorBackoffHandler) -> Self::Output;
}

impl<T, E> WithBackoff for Result<T, E> {
    type Output = Result<T, (E, Duration)>;

    fn with_backoff(self, handler: &mut ErrorBackoffHandler) -> Self::Output {
        match self {
            Ok(ok) => {
                handler.success();
                Ok(ok)
            }
            Err(err) => Err((err, handler.error())),
        }
    }
}

/// Stateful tracker for the current error backoff delay
#[derive(Debug)]
pub struct ErrorBackoffHandler {
    config: ErrorBackoffConfig,
    last_delay: Option<Duration>,
}

impl ErrorBackoffHandler {
    /// Constructs a new handler from an [`ErrorBackoffConfig`]
    pub fn new(config: ErrorBackoffConfig) -> Self {
        Self {
            config,
            last_delay: None,
        }
    }

    /// Reports a success, resetting the backoff state
    pub fn success(&mut self) {
        self.last_delay = None;
    }

    /// Reports a failure and returns the delay to apply before the next
    /// attempt
    pub fn error(&mut self) -> Duration {
        let delay = match self.last_delay {
            None => self.config.initial_error_delay,
            Some(prior) => (prior * self.config.multiplier as u32).min(self.config.max_error_delay),
        };
        self.last_delay = Some(delay);
        delay
    }
}

impl From<ErrorBackoffConfig> for ErrorBackoffHandler {
    fn from(config: ErrorBackoffConfig) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_to_the_cap() {
        let mut handler = ErrorBackoffHandler::new(ErrorBackoffConfig::new(
            Duration::from_millis(100),
            Duration::from_millis(500),
            2,
        ));

        assert_eq!(handler.error(), Duration::from_millis(100));
        assert_eq!(handler.error(), Duration::from_millis(200));
        assert_eq!(handler.error(), Duration::from_millis(400));
        assert_eq!(handler.error(), Duration::from_millis(500));
        assert_eq!(handler.error(), Duration::from_millis(500));
    }

    #[test]
    fn success_resets_the_delay() {
        let mut handler = ErrorBackoffHandler::new(ErrorBackoffConfig::default());

        assert_eq!(handler.error(), Duration::from_millis(100));
        assert_eq!(handler.error(), Duration::from_millis(200));
        handler.success();
        assert_eq!(handler.error(), Duration::from_millis(100));
    }

    #[test]
    fn result_extension_tracks_outcomes() {
        let mut handler = ErrorBackoffHandler::new(ErrorBackoffConfig::default());

        let err = Err::<(), _>("boom").with_backoff(&mut handler).unwrap_err();
        assert_eq!(err, ("boom", Duration::from_millis(100)));

        assert!(Ok::<_, ()>(()).with_backoff(&mut handler).is_ok());
        let err = Err::<(), _>("boom").with_backoff(&mut handler).unwrap_err();
        assert_eq!(err.1, Duration::from_millis(100));
    }
}
