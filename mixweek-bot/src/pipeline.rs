//! Weekly run orchestration
//!
//! Sequences the pipeline stages and drives the playlist and
//! announcement side effects. No stage retries: a failed run surfaces
//! its error and the external scheduler tries again next week.

use crate::links::extract_music_links;
use crate::selection::{build_contribution_map, ContributionMap};
use crate::services::discord::{DiscordClient, DiscordError};
use crate::services::spotify::{PlaylistItem, SpotifyClient, SpotifyError};
use crate::tracks::{resolve_track_ids, TrackBundle};
use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;
use mixweek_common::week::{local_to_utc, week_window, WeekWindow};
use thiserror::Error;
use tracing::info;

/// Fixed prefix of the pinned announcement; also how last week's
/// pinned announcement is recognized for unpinning
pub const ANNOUNCEMENT_PREFIX: &str = "Playlist for the week of";

const TRACK_URI_PREFIX: &str = "spotify:track:";
const MESSAGE_PAGE_SIZE: usize = 100;
const PLAYLIST_PAGE_SIZE: usize = 50;

/// Errors that abort a weekly run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Discord(#[from] DiscordError),

    #[error(transparent)]
    Spotify(#[from] SpotifyError),
}

/// How a run finished
#[derive(Debug)]
pub enum RunOutcome {
    /// The playlist was rebuilt and announced
    Published {
        playlist_url: String,
        track_count: usize,
    },
    /// Nobody contributed a usable track; nothing was written
    EmptyContribution,
}

struct PreparedPlaylist {
    id: String,
    url: String,
}

/// The weekly playlist bot
pub struct WeeklyPlaylistBot {
    discord: DiscordClient,
    spotify: SpotifyClient,
    channel_id: String,
    playlist_name: String,
}

impl WeeklyPlaylistBot {
    pub fn new(
        discord: DiscordClient,
        spotify: SpotifyClient,
        channel_id: impl Into<String>,
        playlist_name: impl Into<String>,
    ) -> Self {
        Self {
            discord,
            spotify,
            channel_id: channel_id.into(),
            playlist_name: playlist_name.into(),
        }
    }

    /// Execute one weekly run
    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        let window = week_window(Local::now().naive_local());
        let after = local_to_utc(window.previous_week_start);
        let before = local_to_utc(window.current_week_start);
        info!(
            from = %window.previous_week_start,
            until = %window.current_week_start,
            "Scanning previous week"
        );

        let messages = self
            .discord
            .messages_in_channel(&self.channel_id, Some(after), Some(before), MESSAGE_PAGE_SIZE)
            .await?;
        info!(count = messages.len(), "Messages retrieved");

        let extracted = extract_music_links(&messages);
        let bundles = resolve_track_ids(&self.spotify, &extracted.links_by_contributor).await?;

        // All write side effects sit past this guard; an all-empty
        // week performs no playlist calls and posts nothing
        if !has_contributions(&bundles) {
            info!("No contributions this week, skipping playlist update");
            return Ok(RunOutcome::EmptyContribution);
        }

        let contributions =
            build_contribution_map(&bundles, &extracted.display_names, &mut rand::thread_rng());
        info!(tracks = contributions.len(), "Contribution map built");

        let description = playlist_description(&window, Local::now().naive_local());
        let playlist = self.prepare_playlist(&description).await?;

        let uris: Vec<String> = contributions
            .keys()
            .map(|track_id| format!("{}{}", TRACK_URI_PREFIX, track_id))
            .collect();
        self.spotify.add_playlist_items(&playlist.id, &uris).await?;

        // Read the playlist back so the credit listing follows the
        // service's actual ordering
        let playlist_items = self.spotify.playlist_items(&playlist.id).await?.items;

        let announcement_text = announcement(&window, &playlist.url);
        let announcement_message = self
            .discord
            .post_message(&self.channel_id, &announcement_text)
            .await?;
        let credits = contributor_credits(&playlist_items, &contributions);
        self.discord.post_message(&self.channel_id, &credits).await?;

        self.rotate_pinned_announcement(&announcement_message.id)
            .await?;

        info!(url = %playlist.url, tracks = uris.len(), "Weekly playlist published");
        Ok(RunOutcome::Published {
            playlist_url: playlist.url,
            track_count: uris.len(),
        })
    }

    /// Locate the destination playlist by exact name, clearing it if
    /// it exists, creating it otherwise.
    async fn prepare_playlist(&self, description: &str) -> Result<PreparedPlaylist, SpotifyError> {
        let mut offset = 0;
        let existing = loop {
            let page = self
                .spotify
                .current_user_playlists(offset, PLAYLIST_PAGE_SIZE)
                .await?;
            if let Some(found) = page.items.iter().find(|p| p.name == self.playlist_name) {
                break Some(found.clone());
            }
            if page.items.len() < PLAYLIST_PAGE_SIZE {
                break None;
            }
            offset += PLAYLIST_PAGE_SIZE;
        };

        match existing {
            Some(playlist) => {
                info!(playlist = %self.playlist_name, "Reusing existing playlist");
                let items = self.spotify.playlist_items(&playlist.id).await?.items;
                let uris: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.track.as_ref())
                    .map(|track| track.uri.clone())
                    .collect();
                if !uris.is_empty() {
                    self.spotify.remove_playlist_items(&playlist.id, &uris).await?;
                }
                self.spotify
                    .change_playlist_details(&playlist.id, description)
                    .await?;

                Ok(PreparedPlaylist {
                    id: playlist.id,
                    url: playlist.external_urls.spotify,
                })
            }
            None => {
                info!(playlist = %self.playlist_name, "Creating playlist");
                let owner = self.spotify.current_user_profile().await?;
                let created = self
                    .spotify
                    .create_playlist(&owner.id, &self.playlist_name, description)
                    .await?;

                Ok(PreparedPlaylist {
                    id: created.id,
                    url: created.external_urls.spotify,
                })
            }
        }
    }

    /// Replace last week's pinned announcement with the new one, then
    /// remove the system notification the pin generates.
    async fn rotate_pinned_announcement(
        &self,
        announcement_id: &str,
    ) -> Result<(), DiscordError> {
        let pinned = self.discord.pinned_messages(&self.channel_id).await?;
        for message in pinned
            .iter()
            .filter(|m| m.author.bot && m.content.starts_with(ANNOUNCEMENT_PREFIX))
        {
            info!(message = %message.id, "Unpinning previous announcement");
            self.discord.unpin_message(&self.channel_id, &message.id).await?;
        }

        self.discord.pin_message(&self.channel_id, announcement_id).await?;
        self.discord
            .delete_recent_pin_notification(&self.channel_id, announcement_id)
            .await
    }
}

/// True when at least one contributor resolved at least one track;
/// decides between publishing and the no-write EmptyContribution exit
fn has_contributions(bundles: &BTreeMap<String, TrackBundle>) -> bool {
    bundles.values().any(|bundle| bundle.unique_track_count > 0)
}

/// en-US short date, month/day/year without zero padding
fn us_date(instant: NaiveDateTime) -> String {
    instant.format("%-m/%-d/%Y").to_string()
}

fn announcement(window: &WeekWindow, playlist_url: &str) -> String {
    format!(
        "{} {} - {}\n{}",
        ANNOUNCEMENT_PREFIX,
        us_date(window.previous_week_start),
        us_date(window.previous_week_end()),
        playlist_url
    )
}

fn playlist_description(window: &WeekWindow, now: NaiveDateTime) -> String {
    format!(
        "User contributions for the week of {} - {}. Last updated: {} {}",
        us_date(window.previous_week_start),
        us_date(window.previous_week_end()),
        us_date(now),
        now.format("%H:%M:%S")
    )
}

/// Numbered credit listing, fenced so Discord renders it verbatim
fn contributor_credits(items: &[PlaylistItem], contributions: &ContributionMap) -> String {
    let mut text = String::from("Contributors:```\n");
    let mut index = 1;

    for item in items {
        let Some(track) = &item.track else { continue };
        let Some(track_id) = &track.id else { continue };
        if let Some(names) = contributions.get(track_id) {
            text.push_str(&format!("{}. {} - {}\n", index, track.name, names.join(", ")));
            index += 1;
        }
    }

    text.push_str("```");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::spotify::PlaylistTrack;
    use chrono::NaiveDate;

    fn window() -> WeekWindow {
        week_window(
            NaiveDate::from_ymd_opt(2026, 8, 26)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
    }

    fn item(id: &str, name: &str) -> PlaylistItem {
        PlaylistItem {
            track: Some(PlaylistTrack {
                id: Some(id.to_string()),
                name: name.to_string(),
                uri: format!("spotify:track:{}", id),
            }),
        }
    }

    #[test]
    fn all_empty_bundles_take_the_no_write_path() {
        let mut bundles = BTreeMap::new();
        bundles.insert("u1".to_string(), TrackBundle::default());
        bundles.insert("u2".to_string(), TrackBundle::default());
        assert!(!has_contributions(&bundles));

        // No messages at all behaves the same way
        assert!(!has_contributions(&BTreeMap::new()));
    }

    #[test]
    fn a_single_resolved_track_publishes() {
        let mut bundles = BTreeMap::new();
        bundles.insert("u1".to_string(), TrackBundle::default());

        let mut contributing = TrackBundle::default();
        contributing.single_track_ids.insert("t1".to_string());
        contributing.unique_track_count = 1;
        bundles.insert("u2".to_string(), contributing);

        assert!(has_contributions(&bundles));
    }

    #[test]
    fn announcement_carries_prefix_and_url() {
        let text = announcement(&window(), "https://example.test/p");
        assert!(text.starts_with(ANNOUNCEMENT_PREFIX));
        assert!(text.ends_with("https://example.test/p"));
        assert!(text.contains("8/17/2026 - 8/23/2026"));
    }

    #[test]
    fn credits_number_only_contributed_tracks() {
        let mut contributions = ContributionMap::new();
        contributions.insert("a".to_string(), vec!["sam".to_string(), "ari".to_string()]);
        contributions.insert("c".to_string(), vec!["kim".to_string()]);

        let items = vec![
            item("a", "First Song"),
            PlaylistItem { track: None },
            item("b", "Interloper"),
            item("c", "Second Song"),
        ];

        let text = contributor_credits(&items, &contributions);
        assert!(text.contains("1. First Song - sam, ari\n"));
        assert!(text.contains("2. Second Song - kim\n"));
        assert!(!text.contains("Interloper"));
        assert!(text.starts_with("Contributors:```\n"));
        assert!(text.ends_with("```"));
    }

    #[test]
    fn description_covers_the_previous_week() {
        let now = NaiveDate::from_ymd_opt(2026, 8, 26)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let text = playlist_description(&window(), now);
        assert!(text.contains("week of 8/17/2026 - 8/23/2026"));
        assert!(text.contains("Last updated: 8/26/2026 10:30:00"));
    }
}
