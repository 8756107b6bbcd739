use std::{error, ops, sync::Arc, time::Duration};

use aliri_clock::{Clock, DurationSecs, System, UnixTime};
use thiserror::Error;
use tokio::sync::watch;

use crate::{
    backoff::{ErrorBackoffConfig, ErrorBackoffHandler, WithBackoff},
    jitter::JitterSource,
    sources::AsyncTokenSource,
    TokenWithLifetime,
};

/// A handle for obtaining the current token, renewed in the background
#[derive(Clone, Debug)]
pub struct TokenWatcher {
    watcher: watch::Receiver<Arc<TokenWithLifetime>>,
}

/// An outstanding borrow of the current token
///
/// Hold this borrow as briefly as possible; outstanding borrows block
/// publication of renewed tokens.
#[derive(Debug)]
pub struct BorrowedToken<'a> {
    inner: watch::Ref<'a, Arc<TokenWithLifetime>>,
}

impl<'a> ops::Deref for BorrowedToken<'a> {
    type Target = TokenWithLifetime;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The background publisher quit and no further tokens will arrive
#[derive(Debug, Error)]
#[error("token publisher has quit")]
pub struct TokenPublisherQuit(#[from] watch::error::RecvError);

impl TokenWatcher {
    /// Spawns a watcher that renews the token from `token_source` as it
    /// becomes stale
    ///
    /// The renewal time is jittered by `jitter_source` so that multiple
    /// instances do not stampede the authority when a token goes stale
    /// everywhere at once. Renewal errors back off according to
    /// `backoff_config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial token cannot be obtained.
    pub async fn spawn_from_token_source<S, J>(
        token_source: S,
        jitter_source: J,
        backoff_config: ErrorBackoffConfig,
    ) -> Result<Self, S::Error>
    where
        S: AsyncTokenSource + 'static,
        J: JitterSource + Send + 'static,
    {
        Self::spawn_from_token_source_with_clock(token_source, jitter_source, backoff_config, System)
            .await
    }

    /// Spawns a watcher using the given clock
    ///
    /// # Errors
    ///
    /// Returns an error if the initial token cannot be obtained.
    pub async fn spawn_from_token_source_with_clock<S, J, C>(
        mut token_source: S,
        jitter_source: J,
        backoff_config: ErrorBackoffConfig,
        clock: C,
    ) -> Result<Self, S::Error>
    where
        S: AsyncTokenSource + 'static,
        J: JitterSource + Send + 'static,
        C: Clock + Send + 'static,
    {
        let initial_token = token_source.request_token().await?;
        let first_stale = initial_token.stale();

        let (tx, rx) = watch::channel(Arc::new(initial_token));

        let join = tokio::spawn(renew_forever(
            token_source,
            jitter_source,
            tx,
            first_stale,
            backoff_config,
            clock,
        ));

        tokio::spawn(async move {
            match join.await {
                Err(err) if err.is_panic() => tracing::error!("token renewal task panicked!"),
                Err(_) => tracing::info!("token renewal task was cancelled"),
                Ok(()) => tracing::info!("all token listeners dropped"),
            }
        });

        Ok(TokenWatcher { watcher: rx })
    }

    /// Borrows the current valid token
    ///
    /// Keep the borrow short-lived; outstanding borrows block the
    /// publisher from reporting new tokens.
    pub fn token(&self) -> BorrowedToken {
        BorrowedToken {
            inner: self.watcher.borrow(),
        }
    }

    /// Waits until a renewed token is published
    ///
    /// # Errors
    ///
    /// Returns an error if the publisher has quit; no further tokens
    /// will be published.
    pub async fn changed(&mut self) -> Result<(), TokenPublisherQuit> {
        Ok(self.watcher.changed().await?)
    }

    /// Clones out the current token
    pub fn snapshot(&self) -> TokenWithLifetime {
        self.token().clone_it()
    }
}

enum Delay {
    UntilTime(UnixTime),
    ForDuration(Duration),
}

async fn renew_forever<S, J, C>(
    mut token_source: S,
    mut jitter_source: J,
    tx: watch::Sender<Arc<TokenWithLifetime>>,
    first_stale: UnixTime,
    backoff_config: ErrorBackoffConfig,
    clock: C,
) where
    S: AsyncTokenSource,
    J: JitterSource,
    C: Clock,
{
    let mut backoff_handler = ErrorBackoffHandler::new(backoff_config);
    let mut stale_epoch = Delay::UntilTime(jitter_source.jitter(first_stale));

    loop {
        match stale_epoch {
            Delay::ForDuration(d) => {
                tokio::time::sleep(d).await;
            }
            Delay::UntilTime(t) => {
                // Sleep in short heartbeats rather than one long sleep:
                // the timer does not advance while a machine is
                // suspended, and a single long sleep could leave a
                // resumed instance sitting on an expired token far past
                // its stale time.
                const HEARTBEAT: DurationSecs = DurationSecs(30);
                loop {
                    let now = clock.now();
                    if now >= t {
                        tracing::trace!("token now stale");
                        break;
                    }

                    let until_stale = t - now;
                    let delay = until_stale.min(HEARTBEAT);
                    tracing::trace!(
                        delay = delay.0,
                        until_stale = until_stale.0,
                        "token not yet stale, sleeping"
                    );
                    tokio::time::sleep(delay.into()).await;
                }
            }
        }

        tracing::debug!("requesting new token");
        stale_epoch = match token_source
            .request_token()
            .await
            .with_backoff(&mut backoff_handler)
        {
            Ok(token) => {
                let token_stale = token.stale();

                if tx.send(Arc::new(token)).is_err() {
                    tracing::info!(
                        "no one is listening for token renewals anymore, halting renewals"
                    );
                    return;
                }

                tracing::debug!(
                    stale = token_stale.0,
                    delay = (token_stale - clock.now()).0,
                    "waiting for token to become stale"
                );
                Delay::UntilTime(jitter_source.jitter(token_stale))
            }
            Err((error, delay)) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    delay_ms = delay.as_millis() as u64,
                    "error requesting token, will retry"
                );
                Delay::ForDuration(delay)
            }
        };
    }
}
