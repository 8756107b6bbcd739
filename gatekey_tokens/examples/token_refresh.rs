use std::time::Duration;

use aliri_clock::DurationSecs;
use clap::Parser;
use gatekey_tokens::{
    backoff, jitter, sources, ClientId, ClientSecret, RefreshToken, TokenLifetimeConfig,
    TokenStatus, TokenWatcher,
};
use tokio::time;

/// Keeps an access token fresh through the refresh-token grant,
/// reporting its status every few seconds
#[derive(Debug, Parser)]
struct Opts {
    /// The issuing authority's token request URL
    #[arg(short, long, env)]
    token_url: reqwest::Url,

    /// The client ID of the client
    #[arg(short, long, env)]
    client_id: ClientId,

    /// The client secret used to identify the client to the issuing authority
    #[arg(short = 's', long, env, hide_env_values = true)]
    client_secret: ClientSecret,

    /// The refresh token seeding the renewal loop
    #[arg(short, long, env, hide_env_values = true)]
    refresh_token: RefreshToken,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let client = reqwest::Client::builder().https_only(true).build()?;

    let credentials = sources::oauth2::dto::ClientCredentials {
        client_id: opts.client_id,
        client_secret: opts.client_secret,
    };

    let source = sources::oauth2::RefreshTokenSource::new(
        client,
        opts.token_url,
        credentials.into(),
        opts.refresh_token.into_boxed_ref(),
        TokenLifetimeConfig::default(),
    );

    let watcher = TokenWatcher::spawn_from_token_source(
        source,
        jitter::RandomEarlyJitter::new(DurationSecs(60)),
        backoff::ErrorBackoffConfig::default(),
    )
    .await?;

    tracing::info!(
        token = format_args!("{:#?}", watcher.token().access_token()),
        "first access token"
    );

    let mut interval = time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;

        let token = watcher.token();
        let status = token.token_status();
        match status {
            TokenStatus::Fresh => {
                tracing::debug!(
                    ?status,
                    stale = token.stale().0,
                    expiry = token.expiry().0,
                    "pulled token"
                )
            }
            TokenStatus::Stale => {
                tracing::warn!(
                    ?status,
                    stale = token.stale().0,
                    expiry = token.expiry().0,
                    "pulled token"
                )
            }
            TokenStatus::Expired => {
                tracing::error!(
                    ?status,
                    stale = token.stale().0,
                    expiry = token.expiry().0,
                    "pulled token"
                )
            }
        }
    }
}
