//! mixweek-bot - Weekly collaborative playlist bot
//!
//! Scans the configured Discord channel for last week's shared Spotify
//! links, rebuilds the shared playlist from a fair per-contributor
//! selection, and announces the result. Runs once per invocation; the
//! external scheduler provides the weekly cadence.

use anyhow::Result;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use mixweek_bot::services::{DiscordClient, SpotifyClient};
use mixweek_bot::{RunOutcome, WeeklyPlaylistBot};
use mixweek_common::config::Settings;

#[tokio::main]
async fn main() {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to initialize logging");
    }

    info!("Weekly playlist bot started");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let had_errors = match run().await {
        Ok(RunOutcome::Published {
            playlist_url,
            track_count,
        }) => {
            info!(url = %playlist_url, tracks = track_count, "Run complete");
            false
        }
        Ok(RunOutcome::EmptyContribution) => {
            info!("Run complete, no contributions this week");
            false
        }
        Err(e) => {
            error!("{:#}", e);
            true
        }
    };

    info!(
        "Weekly playlist bot exited {} errors",
        if had_errors { "with" } else { "without" }
    );
    std::process::exit(i32::from(had_errors));
}

async fn run() -> Result<RunOutcome> {
    let settings = Settings::load()?;

    let discord = DiscordClient::new(settings.discord_token)?;
    let spotify = SpotifyClient::new(
        settings.spotify_client_id,
        settings.spotify_client_secret,
        settings.spotify_refresh_token,
    )?;

    let bot = WeeklyPlaylistBot::new(
        discord,
        spotify,
        settings.discord_channel_id,
        settings.playlist_name,
    );
    Ok(bot.run().await?)
}
