//! Spotify Web API adapter for artist search, track listing and playlist edits.
//!
//! The engine only sees the [`MusicService`] and [`PlaylistService`] traits;
//! tests swap in in-memory fakes.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::rate_limiter::{RateLimiter, Sleeper};
use crate::transport::{HttpClient, Request};

const API_ROOT: &str = "https://api.spotify.com/v1";

/// Largest page Spotify serves for album listings.
const ALBUM_PAGE: u32 = 50;
/// Largest page and largest edit Spotify accepts for playlist items.
pub const PLAYLIST_PAGE: usize = 100;

/// One artist search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistHit {
    pub name: String,
    pub uri: String,
    pub genres: Vec<String>,
}

/// A track with the name of its first credited artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub uri: String,
    pub artist: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumTrack {
    pub uri: String,
    pub name: String,
    pub artist: String,
    pub duration_ms: u64,
}

/// Search and catalog browsing.
pub trait MusicService {
    fn search_artist(&mut self, query: &str, limit: u32) -> Result<Vec<ArtistHit>>;
    /// The service's curated top tracks for an artist.
    fn popular_tracks(&mut self, artist_uri: &str) -> Result<Vec<TrackRef>>;
    /// Album uris, every page.
    fn albums(&mut self, artist_uri: &str) -> Result<Vec<String>>;
    fn album_tracks(&mut self, album_uri: &str) -> Result<Vec<AlbumTrack>>;
}

/// Playlist editing. Edits take at most [`PLAYLIST_PAGE`] uris.
pub trait PlaylistService {
    /// First page (up to [`PLAYLIST_PAGE`]) of item uris.
    fn playlist_items(&mut self, playlist_id: &str) -> Result<Vec<String>>;
    fn playlist_len(&mut self, playlist_id: &str) -> Result<usize>;
    fn remove_items(&mut self, playlist_id: &str, uris: &[String]) -> Result<()>;
    fn add_items(&mut self, playlist_id: &str, uris: &[String]) -> Result<()>;
    /// Replace the whole playlist with `uris`, including items that have no
    /// removable uri (unavailable tracks, local files).
    fn replace_items(&mut self, playlist_id: &str, uris: &[String]) -> Result<()>;
}

/// Local files show up in playlists but cannot be removed by uri.
const LOCAL_PREFIX: &str = "spotify:local:";

/// `spotify:artist:4tZwfgrHOc3mvqYlEYSvVi` → `4tZwfgrHOc3mvqYlEYSvVi`.
pub fn uri_id(uri: &str) -> &str {
    uri.rsplit(':').next().unwrap_or(uri)
}

// ── API response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiSearch {
    artists: ApiPage<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
    uri: String,
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiArtistRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    uri: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<ApiArtistRef>,
}

impl ApiTrack {
    fn first_artist(&self) -> String {
        self.artists.first().map(|a| a.name.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ApiTopTracks {
    tracks: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylistItem {
    /// `null` for items that are no longer available.
    track: Option<ApiPlaylistTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylistTrack {
    uri: Option<String>,
}

fn playlist_uris(page: ApiPage<ApiPlaylistItem>) -> Vec<String> {
    page.items
        .into_iter()
        .filter_map(|item| item.track.and_then(|t| t.uri))
        .filter(|uri| !uri.starts_with(LOCAL_PREFIX))
        .collect()
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct SpotifyClient {
    http: HttpClient,
    token: String,
    market: String,
}

impl SpotifyClient {
    pub fn new(token: &str, market: &str, pause_ms: u64, max_retries: u32, sleeper: Arc<dyn Sleeper>) -> Self {
        let limiter = RateLimiter::from_millis("Spotify", pause_ms, sleeper);
        SpotifyClient {
            http: HttpClient::new(limiter, max_retries),
            token: token.to_string(),
            market: market.to_string(),
        }
    }

    fn get<T: DeserializeOwned>(&mut self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let mut request = Request::get(url).bearer(&self.token);
        for (key, value) in query {
            request = request.query(key, value);
        }
        self.http.send_json(&request)
    }

    /// Follow `next` links until the last page.
    fn get_all<T: DeserializeOwned>(&mut self, url: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let mut page: ApiPage<T> = self.get(url, query)?;
        let mut items = std::mem::take(&mut page.items);
        while let Some(next) = page.next.take() {
            page = self.get(&next, &[])?;
            items.append(&mut page.items);
        }
        Ok(items)
    }

    fn playlist_url(playlist_id: &str) -> String {
        format!("{API_ROOT}/playlists/{}/tracks", uri_id(playlist_id))
    }
}

impl MusicService for SpotifyClient {
    fn search_artist(&mut self, query: &str, limit: u32) -> Result<Vec<ArtistHit>> {
        let url = format!("{API_ROOT}/search");
        let response: ApiSearch = self.get(
            &url,
            &[
                ("q", query.to_string()),
                ("type", "artist".to_string()),
                ("limit", limit.to_string()),
            ],
        )?;
        Ok(response
            .artists
            .items
            .into_iter()
            .map(|a| ArtistHit {
                name: a.name,
                uri: a.uri,
                genres: a.genres,
            })
            .collect())
    }

    fn popular_tracks(&mut self, artist_uri: &str) -> Result<Vec<TrackRef>> {
        let url = format!("{API_ROOT}/artists/{}/top-tracks", uri_id(artist_uri));
        let market = self.market.clone();
        let response: ApiTopTracks = self.get(&url, &[("market", market)])?;
        Ok(response
            .tracks
            .into_iter()
            .map(|t| TrackRef {
                artist: t.first_artist(),
                uri: t.uri,
            })
            .collect())
    }

    fn albums(&mut self, artist_uri: &str) -> Result<Vec<String>> {
        let url = format!("{API_ROOT}/artists/{}/albums", uri_id(artist_uri));
        let market = self.market.clone();
        let albums: Vec<ApiAlbum> = self.get_all(
            &url,
            &[
                ("include_groups", "album,single".to_string()),
                ("limit", ALBUM_PAGE.to_string()),
                ("market", market),
            ],
        )?;
        Ok(albums.into_iter().map(|a| a.uri).collect())
    }

    fn album_tracks(&mut self, album_uri: &str) -> Result<Vec<AlbumTrack>> {
        let url = format!("{API_ROOT}/albums/{}/tracks", uri_id(album_uri));
        let tracks: Vec<ApiTrack> = self.get_all(&url, &[("limit", ALBUM_PAGE.to_string())])?;
        Ok(tracks
            .into_iter()
            .map(|t| AlbumTrack {
                artist: t.first_artist(),
                uri: t.uri,
                name: t.name,
                duration_ms: t.duration_ms,
            })
            .collect())
    }
}

impl PlaylistService for SpotifyClient {
    fn playlist_items(&mut self, playlist_id: &str) -> Result<Vec<String>> {
        let url = Self::playlist_url(playlist_id);
        let page: ApiPage<ApiPlaylistItem> = self.get(
            &url,
            &[
                ("limit", PLAYLIST_PAGE.to_string()),
                ("fields", "items(track(uri)),next,total".to_string()),
            ],
        )?;
        Ok(playlist_uris(page))
    }

    fn playlist_len(&mut self, playlist_id: &str) -> Result<usize> {
        let url = Self::playlist_url(playlist_id);
        let page: ApiPage<ApiPlaylistItem> =
            self.get(&url, &[("limit", "1".to_string()), ("fields", "total".to_string())])?;
        Ok(page.total)
    }

    fn remove_items(&mut self, playlist_id: &str, uris: &[String]) -> Result<()> {
        check_batch(uris)?;
        let url = Self::playlist_url(playlist_id);
        let tracks: Vec<Value> = uris.iter().map(|uri| json!({ "uri": uri })).collect();
        let request = Request::delete(&url, json!({ "tracks": tracks })).bearer(&self.token);
        let _: Value = self.http.send_json(&request)?;
        Ok(())
    }

    fn add_items(&mut self, playlist_id: &str, uris: &[String]) -> Result<()> {
        check_batch(uris)?;
        let url = Self::playlist_url(playlist_id);
        let request = Request::post(&url, json!({ "uris": uris })).bearer(&self.token);
        let _: Value = self.http.send_json(&request)?;
        Ok(())
    }

    fn replace_items(&mut self, playlist_id: &str, uris: &[String]) -> Result<()> {
        check_batch(uris)?;
        let url = Self::playlist_url(playlist_id);
        let request = Request::put(&url, json!({ "uris": uris })).bearer(&self.token);
        let _: Value = self.http.send_json(&request)?;
        Ok(())
    }
}

fn check_batch(uris: &[String]) -> Result<()> {
    if uris.len() > PLAYLIST_PAGE {
        return Err(Error::Config(format!(
            "playlist edits take at most {PLAYLIST_PAGE} items, got {}",
            uris.len()
        )));
    }
    Ok(())
}
