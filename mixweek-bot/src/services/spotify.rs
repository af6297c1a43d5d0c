//! Spotify Web API client
//!
//! Playlist management plus album/playlist expansion endpoints. The
//! client owns its OAuth session: the access token lives in an
//! explicit session object and is refreshed from the configured
//! refresh token before first use and again whenever it approaches
//! expiry. No token state escapes the client.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const USER_AGENT: &str = "mixweek-bot/0.1.0";

/// Host of shareable Spotify web links
pub const SPOTIFY_WEB_DOMAIN: &str = "open.spotify.com";

/// Refresh the access token when it expires within this margin
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Spotify client errors
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Network communication error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Token refresh failed
    #[error("Authorization error: {0}")]
    AuthError(String),

    /// Spotify API returned a non-success response
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Failed to parse API response JSON
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Generic paging envelope used by listing endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
}

/// A playlist as listed under the owner's playlists
#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedPlaylist {
    pub id: String,
    pub name: String,
    pub external_urls: ExternalUrls,
}

/// Shareable URLs for an object
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalUrls {
    pub spotify: String,
}

/// One entry of a playlist; removed and local tracks carry no track
/// object or no track id
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    pub track: Option<PlaylistTrack>,
}

/// Track embedded in a playlist item
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTrack {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
}

/// Album with its track listing, from the batch albums endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    pub id: String,
    pub tracks: Paging<AlbumTrack>,
}

/// Track entry inside an album listing
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumTrack {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeveralAlbums {
    pub albums: Vec<Album>,
}

/// Current-user profile (only the id is needed)
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
}

/// Response of the playlist-creation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Access token with its expiry instant
#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn expiring_soon(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(TOKEN_EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// Source of fresh sessions, seamed off so the reuse logic of
/// [`current_token`] is testable without the real token endpoint
#[async_trait]
trait TokenRefresher: Sync {
    async fn refresh(&self) -> Result<Session, SpotifyError>;
}

/// Token for the current request, refreshing only when the held
/// session is absent or inside the expiry margin. Back-to-back calls
/// against a fresh session reuse it without touching the refresher.
async fn current_token<R: TokenRefresher>(
    session: &Mutex<Option<Session>>,
    refresher: &R,
) -> Result<String, SpotifyError> {
    let mut guard = session.lock().await;

    match guard.as_ref() {
        Some(current) if !current.expiring_soon() => Ok(current.access_token.clone()),
        _ => {
            let refreshed = refresher.refresh().await?;
            let token = refreshed.access_token.clone();
            *guard = Some(refreshed);
            Ok(token)
        }
    }
}

/// Spotify Web API client
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    session: Mutex<Option<Session>>,
}

impl SpotifyClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, SpotifyError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        Ok(Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            session: Mutex::new(None),
        })
    }

    /// Current access token, refreshing the session when it is absent
    /// or about to expire
    async fn bearer(&self) -> Result<String, SpotifyError> {
        current_token(&self.session, self).await
    }

    async fn refresh_session(&self) -> Result<Session, SpotifyError> {
        debug!("Refreshing Spotify access token");

        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .http
            .post(SPOTIFY_TOKEN_URL)
            .header("Authorization", format!("Basic {}", basic))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpotifyError::AuthError(format!(
                "token refresh returned {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::ParseError(e.to_string()))?;

        Ok(Session {
            access_token: token.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(token.expires_in),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<T, SpotifyError> {
        let url = format!("{}/{}", SPOTIFY_API_BASE_URL, endpoint);
        debug!(url = %url, "Spotify GET");

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        Self::parse_response(response).await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T, SpotifyError> {
        let url = format!("{}/{}", SPOTIFY_API_BASE_URL, endpoint);
        debug!(url = %url, method = %method, "Spotify request");

        let response = self
            .http
            .request(method, &url)
            .bearer_auth(self.bearer().await?)
            .json(body)
            .send()
            .await
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        Self::parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SpotifyError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpotifyError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| SpotifyError::ParseError(e.to_string()))
    }

    /// Profile of the account the refresh token belongs to
    pub async fn current_user_profile(&self) -> Result<UserProfile, SpotifyError> {
        self.get_json("me").await
    }

    /// One page of the owner's playlists
    pub async fn current_user_playlists(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Paging<SimplifiedPlaylist>, SpotifyError> {
        self.get_json(&format!("me/playlists?offset={}&limit={}", offset, limit))
            .await
    }

    /// Items of a playlist, in playlist order
    pub async fn playlist_items(
        &self,
        playlist_id: &str,
    ) -> Result<Paging<PlaylistItem>, SpotifyError> {
        self.get_json(&format!("playlists/{}/tracks", playlist_id))
            .await
    }

    /// Remove the given track URIs from a playlist
    pub async fn remove_playlist_items(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), SpotifyError> {
        let tracks: Vec<serde_json::Value> = uris
            .iter()
            .map(|uri| serde_json::json!({ "uri": uri }))
            .collect();
        let body = serde_json::json!({ "tracks": tracks });

        let _: serde_json::Value = self
            .send_json(
                reqwest::Method::DELETE,
                &format!("playlists/{}/tracks", playlist_id),
                &body,
            )
            .await?;
        Ok(())
    }

    /// Append the given track URIs to a playlist in one call
    pub async fn add_playlist_items(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), SpotifyError> {
        let body = serde_json::json!({ "uris": uris });

        let _: serde_json::Value = self
            .send_json(
                reqwest::Method::POST,
                &format!("playlists/{}/tracks", playlist_id),
                &body,
            )
            .await?;
        Ok(())
    }

    /// Update a playlist's description
    pub async fn change_playlist_details(
        &self,
        playlist_id: &str,
        description: &str,
    ) -> Result<(), SpotifyError> {
        let url = format!("{}/playlists/{}", SPOTIFY_API_BASE_URL, playlist_id);
        let body = serde_json::json!({ "description": description });

        let response = self
            .http
            .put(&url)
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpotifyError::ApiError(status.as_u16(), error_text));
        }
        Ok(())
    }

    /// Create a private, non-collaborative playlist for a user
    pub async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<CreatedPlaylist, SpotifyError> {
        let body = serde_json::json!({
            "name": name,
            "public": false,
            "collaborative": false,
            "description": description,
        });

        self.send_json(
            reqwest::Method::POST,
            &format!("users/{}/playlists", user_id),
            &body,
        )
        .await
    }

    /// Fetch several albums, with track listings, in one batch call
    pub async fn several_albums(&self, album_ids: &[String]) -> Result<SeveralAlbums, SpotifyError> {
        self.get_json(&format!("albums?ids={}", album_ids.join(",")))
            .await
    }
}

#[async_trait]
impl TokenRefresher for SpotifyClient {
    async fn refresh(&self) -> Result<Session, SpotifyError> {
        self.refresh_session().await
    }
}
