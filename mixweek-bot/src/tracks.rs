//! Track-id resolution
//!
//! Expands each contributor's links into three pairwise-disjoint sets
//! of track ids: direct track links, tracks reached through album
//! expansion, and tracks reached through playlist expansion. Albums
//! and playlists are fetched at most once per run through run-scoped
//! caches shared across contributors.

use crate::services::spotify::{PlaylistItem, SpotifyClient, SpotifyError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};
use url::Url;

/// A link classified by its path shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotifyResource {
    Track(String),
    Album(String),
    Playlist(String),
}

/// Classify a Spotify web link by path shape; anything that is not a
/// track, album, or playlist link is ignored.
pub fn classify_link(link: &str) -> Option<SpotifyResource> {
    let url = Url::parse(link).ok()?;
    let mut segments = url.path_segments()?;
    let kind = segments.next()?;
    let id = segments.next().filter(|id| !id.is_empty())?;

    match kind {
        "track" => Some(SpotifyResource::Track(id.to_string())),
        "album" => Some(SpotifyResource::Album(id.to_string())),
        "playlist" => Some(SpotifyResource::Playlist(id.to_string())),
        _ => None,
    }
}

/// One contributor's resolved track ids.
///
/// The three sets are pairwise disjoint and `unique_track_count`
/// always equals the sum of their sizes; both invariants are
/// maintained at insertion time.
#[derive(Debug, Default, Clone)]
pub struct TrackBundle {
    /// Ids from direct track links
    pub single_track_ids: HashSet<String>,
    /// Ids reached via album expansion, minus ids already in
    /// `single_track_ids`
    pub album_track_ids: HashSet<String>,
    /// Ids reached via playlist expansion, minus ids already in either
    /// earlier set
    pub playlist_track_ids: HashSet<String>,
    /// Total distinct ids across all three sets
    pub unique_track_count: usize,
}

impl TrackBundle {
    fn add_single(&mut self, id: String) {
        if self.single_track_ids.insert(id) {
            self.unique_track_count += 1;
        }
    }

    fn add_album_track(&mut self, id: String) {
        if self.single_track_ids.contains(&id) {
            return;
        }
        if self.album_track_ids.insert(id) {
            self.unique_track_count += 1;
        }
    }

    fn add_playlist_track(&mut self, id: String) {
        if self.single_track_ids.contains(&id) || self.album_track_ids.contains(&id) {
            return;
        }
        if self.playlist_track_ids.insert(id) {
            self.unique_track_count += 1;
        }
    }
}

/// Remote capability for expanding albums and playlists into tracks
#[async_trait]
pub trait TrackSource: Sync {
    /// Batch-fetch several albums, returning album id -> ordered
    /// track-id list
    async fn albums_tracks(
        &self,
        album_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, SpotifyError>;

    /// Fetch a playlist's items in playlist order
    async fn playlist_items(&self, playlist_id: &str) -> Result<Vec<PlaylistItem>, SpotifyError>;
}

#[async_trait]
impl TrackSource for SpotifyClient {
    async fn albums_tracks(
        &self,
        album_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, SpotifyError> {
        let response = self.several_albums(album_ids).await?;
        Ok(response
            .albums
            .into_iter()
            .map(|album| {
                let track_ids = album.tracks.items.into_iter().map(|t| t.id).collect();
                (album.id, track_ids)
            })
            .collect())
    }

    async fn playlist_items(&self, playlist_id: &str) -> Result<Vec<PlaylistItem>, SpotifyError> {
        Ok(SpotifyClient::playlist_items(self, playlist_id).await?.items)
    }
}

/// Resolve every contributor's links into a [`TrackBundle`].
///
/// Uncached albums are batch-fetched in a single call per contributor;
/// uncached playlists are fetched concurrently and awaited together,
/// the first failure aborting the whole run with no partial results.
pub async fn resolve_track_ids<S: TrackSource>(
    source: &S,
    links_by_contributor: &BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<String, TrackBundle>, SpotifyError> {
    let mut album_cache: HashMap<String, Vec<String>> = HashMap::new();
    let mut playlist_cache: HashMap<String, Vec<PlaylistItem>> = HashMap::new();
    let mut bundles = BTreeMap::new();

    for (contributor_id, links) in links_by_contributor {
        let mut track_ids = Vec::new();
        let mut album_ids = Vec::new();
        let mut playlist_ids = Vec::new();

        for link in links {
            match classify_link(link) {
                Some(SpotifyResource::Track(id)) => track_ids.push(id),
                Some(SpotifyResource::Album(id)) => album_ids.push(id),
                Some(SpotifyResource::Playlist(id)) => playlist_ids.push(id),
                None => debug!(link = %link, "Ignoring unrecognized link shape"),
            }
        }

        let mut bundle = TrackBundle::default();

        for id in track_ids {
            bundle.add_single(id);
        }

        let albums_to_fetch = uncached(&album_ids, &album_cache);
        if !albums_to_fetch.is_empty() {
            let fetched = source.albums_tracks(&albums_to_fetch).await?;
            album_cache.extend(fetched);
        }
        for album_id in &album_ids {
            match album_cache.get(album_id) {
                Some(ids) => {
                    for id in ids {
                        bundle.add_album_track(id.clone());
                    }
                }
                None => warn!(album = %album_id, "Album missing from batch response, skipping"),
            }
        }

        let playlists_to_fetch = uncached(&playlist_ids, &playlist_cache);
        let fetches = playlists_to_fetch.iter().map(|playlist_id| async move {
            let items = source.playlist_items(playlist_id).await?;
            Ok::<_, SpotifyError>((playlist_id.clone(), items))
        });
        for (playlist_id, items) in futures::future::try_join_all(fetches).await? {
            playlist_cache.insert(playlist_id, items);
        }
        for playlist_id in &playlist_ids {
            let Some(items) = playlist_cache.get(playlist_id) else {
                continue;
            };
            for item in items {
                let Some(track) = &item.track else { continue };
                let Some(id) = &track.id else { continue };
                bundle.add_playlist_track(id.clone());
            }
        }

        debug_assert_eq!(
            bundle.unique_track_count,
            bundle.single_track_ids.len()
                + bundle.album_track_ids.len()
                + bundle.playlist_track_ids.len()
        );

        bundles.insert(contributor_id.clone(), bundle);
    }

    Ok(bundles)
}

/// Ids not yet in the cache, deduplicated, in first-seen order
fn uncached<V>(ids: &[String], cache: &HashMap<String, V>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| !cache.contains_key(*id) && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_the_three_shapes() {
        assert_eq!(
            classify_link("https://open.spotify.com/track/abc"),
            Some(SpotifyResource::Track("abc".to_string()))
        );
        assert_eq!(
            classify_link("https://open.spotify.com/album/def"),
            Some(SpotifyResource::Album("def".to_string()))
        );
        assert_eq!(
            classify_link("https://open.spotify.com/playlist/ghi"),
            Some(SpotifyResource::Playlist("ghi".to_string()))
        );
    }

    #[test]
    fn classify_ignores_other_shapes() {
        assert_eq!(classify_link("https://open.spotify.com/artist/xyz"), None);
        assert_eq!(classify_link("https://open.spotify.com/"), None);
        assert_eq!(classify_link("https://open.spotify.com/track/"), None);
        assert_eq!(classify_link("not a url"), None);
    }

    #[test]
    fn bundle_sets_stay_disjoint() {
        let mut bundle = TrackBundle::default();
        bundle.add_single("a".to_string());
        bundle.add_album_track("a".to_string());
        bundle.add_album_track("b".to_string());
        bundle.add_playlist_track("a".to_string());
        bundle.add_playlist_track("b".to_string());
        bundle.add_playlist_track("c".to_string());

        assert_eq!(bundle.single_track_ids.len(), 1);
        assert_eq!(bundle.album_track_ids.len(), 1);
        assert_eq!(bundle.playlist_track_ids.len(), 1);
        assert_eq!(bundle.unique_track_count, 3);
    }

    #[test]
    fn bundle_count_matches_set_sizes_after_repeats() {
        let mut bundle = TrackBundle::default();
        bundle.add_single("a".to_string());
        bundle.add_single("a".to_string());
        bundle.add_album_track("b".to_string());
        bundle.add_album_track("b".to_string());

        assert_eq!(
            bundle.unique_track_count,
            bundle.single_track_ids.len()
                + bundle.album_track_ids.len()
                + bundle.playlist_track_ids.len()
        );
        assert_eq!(bundle.unique_track_count, 2);
    }

    #[test]
    fn uncached_dedups_and_preserves_order() {
        let mut cache: HashMap<String, Vec<String>> = HashMap::new();
        cache.insert("cached".to_string(), Vec::new());

        let ids = vec![
            "x".to_string(),
            "cached".to_string(),
            "y".to_string(),
            "x".to_string(),
        ];
        assert_eq!(uncached(&ids, &cache), vec!["x".to_string(), "y".to_string()]);
    }
}
