//! In-memory services for tests. Every call is recorded.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::interrupt::CancelFlag;
use crate::lastfm::{Period, RankingService};
use crate::leaderboard::{ArtistScrobbleRecord, LeaderboardPage};
use crate::spotify::{AlbumTrack, ArtistHit, MusicService, PlaylistService, TrackRef, PLAYLIST_PAGE};

/// Charts for a handful of users. Artist `i` of a chart is named `artist{i}`.
pub struct FakeRanking {
    charts: HashMap<String, Vec<ArtistScrobbleRecord>>,
    /// Largest page the fake serves, whatever is asked for.
    max_page_size: u32,
    requests: Vec<(String, u32)>,
    failures: VecDeque<Error>,
}

impl FakeRanking {
    pub fn with_user(username: &str, counts: &[u64], max_page_size: u32) -> Self {
        FakeRanking {
            charts: HashMap::new(),
            max_page_size,
            requests: Vec::new(),
            failures: VecDeque::new(),
        }
        .and_user(username, counts)
    }

    pub fn and_user(mut self, username: &str, counts: &[u64]) -> Self {
        let records = counts
            .iter()
            .enumerate()
            .map(|(i, c)| ArtistScrobbleRecord::new(format!("artist{i}"), *c))
            .collect();
        self.charts.insert(username.to_string(), records);
        self
    }

    /// The next `count` requests fail with `error()`.
    pub fn fail_next(&mut self, count: usize, error: impl Fn() -> Error) {
        for _ in 0..count {
            self.failures.push_back(error());
        }
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requests.iter().map(|(_, page)| *page).collect()
    }

    pub fn requests_for(&self, username: &str) -> usize {
        self.requests.iter().filter(|(user, _)| user == username).count()
    }
}

impl RankingService for FakeRanking {
    fn get_top_artists(
        &mut self,
        username: &str,
        page: u32,
        page_size: u32,
        _period: Period,
    ) -> Result<LeaderboardPage> {
        self.requests.push((username.to_string(), page));
        if let Some(error) = self.failures.pop_front() {
            return Err(error);
        }
        let chart = self.charts.get(username).ok_or_else(|| Error::Service {
            code: 6,
            message: "User not found".into(),
        })?;

        let size = page_size.min(self.max_page_size).max(1) as usize;
        let start = (page.max(1) as usize - 1) * size;
        let records = chart.iter().skip(start).take(size).cloned().collect();
        let total_pages = chart.len().div_ceil(size) as u32;
        Ok(LeaderboardPage::new(records, Some(total_pages)))
    }
}

struct FakeArtist {
    name: String,
    uri: String,
    genres: Vec<String>,
    popular: Vec<TrackRef>,
    albums: Vec<String>,
}

/// A music catalog plus playlists.
///
/// Playlist items starting with `spotify:local:` behave like local files:
/// listed by length, never by item, and only cleared by a replacement.
///
/// Search returns every artist whose name contains the query, ignoring case,
/// so exact-match filtering is exercised. Popular track `i` of an artist
/// added with [`FakeSpotify::artist`] is `spotify:track:{name}:{i}`.
#[derive(Default)]
pub struct FakeSpotify {
    artists: Vec<FakeArtist>,
    album_tracks: HashMap<String, Vec<AlbumTrack>>,
    playlists: HashMap<String, Vec<String>>,
    failing_searches: HashSet<String>,
    cancel_on: Option<(String, CancelFlag)>,
    pub search_calls: Vec<String>,
    /// Popular-track, album and album-track requests.
    pub catalog_calls: usize,
    pub removed_batches: Vec<usize>,
    pub added_batches: Vec<usize>,
    /// Wholesale playlist replacements.
    pub replaced: usize,
}

pub fn album_track(uri: &str, name: &str, artist: &str, duration_ms: u64) -> AlbumTrack {
    AlbumTrack {
        uri: uri.to_string(),
        name: name.to_string(),
        artist: artist.to_string(),
        duration_ms,
    }
}

impl FakeSpotify {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artist(self, name: &str, genres: &[&str], popular: usize) -> Self {
        let tracks = (0..popular)
            .map(|i| TrackRef {
                uri: format!("spotify:track:{name}:{i}"),
                artist: name.to_string(),
            })
            .collect();
        self.artist_with_tracks(name, genres, tracks)
    }

    pub fn artist_with_tracks(mut self, name: &str, genres: &[&str], popular: Vec<TrackRef>) -> Self {
        self.artists.push(FakeArtist {
            name: name.to_string(),
            uri: format!("spotify:artist:{name}"),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            popular,
            albums: Vec::new(),
        });
        self
    }

    /// Add an album to an artist added before.
    pub fn album(mut self, artist: &str, tracks: Vec<AlbumTrack>) -> Self {
        let album_uri = format!("spotify:album:{artist}:{}", self.album_tracks.len());
        let owner = self
            .artists
            .iter_mut()
            .find(|a| a.name == artist)
            .unwrap_or_else(|| panic!("add {artist} before its albums"));
        owner.albums.push(album_uri.clone());
        self.album_tracks.insert(album_uri, tracks);
        self
    }

    pub fn with_playlist(mut self, id: &str, items: Vec<String>) -> Self {
        self.playlists.insert(id.to_string(), items);
        self
    }

    /// Searching for exactly `query` fails like an exhausted transport.
    pub fn fail_search(mut self, query: &str) -> Self {
        self.failing_searches.insert(query.to_string());
        self
    }

    /// Searching for exactly `query` raises `flag`, as if the operator hit Esc.
    pub fn cancel_on_search(mut self, query: &str, flag: CancelFlag) -> Self {
        self.cancel_on = Some((query.to_string(), flag));
        self
    }

    pub fn uri_of(&self, name: &str) -> String {
        format!("spotify:artist:{name}")
    }

    pub fn playlist(&self, id: &str) -> &[String] {
        self.playlists.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn by_uri(&self, uri: &str) -> Result<&FakeArtist> {
        self.artists.iter().find(|a| a.uri == uri).ok_or_else(|| Error::Http {
            status: 404,
            url: uri.to_string(),
        })
    }

    fn playlist_mut(&mut self, id: &str) -> Result<&mut Vec<String>> {
        self.playlists.get_mut(id).ok_or_else(|| Error::Http {
            status: 404,
            url: id.to_string(),
        })
    }
}

impl MusicService for FakeSpotify {
    fn search_artist(&mut self, query: &str, limit: u32) -> Result<Vec<ArtistHit>> {
        self.search_calls.push(query.to_string());
        if self.failing_searches.contains(query) {
            return Err(Error::Http {
                status: 503,
                url: "https://api.spotify.com/v1/search".into(),
            });
        }
        if let Some((trigger, flag)) = &self.cancel_on {
            if trigger == query {
                flag.cancel();
            }
        }
        let needle = query.to_lowercase();
        Ok(self
            .artists
            .iter()
            .filter(|a| a.name.to_lowercase().contains(&needle))
            .take(limit as usize)
            .map(|a| ArtistHit {
                name: a.name.clone(),
                uri: a.uri.clone(),
                genres: a.genres.clone(),
            })
            .collect())
    }

    fn popular_tracks(&mut self, artist_uri: &str) -> Result<Vec<TrackRef>> {
        self.catalog_calls += 1;
        Ok(self.by_uri(artist_uri)?.popular.clone())
    }

    fn albums(&mut self, artist_uri: &str) -> Result<Vec<String>> {
        self.catalog_calls += 1;
        Ok(self.by_uri(artist_uri)?.albums.clone())
    }

    fn album_tracks(&mut self, album_uri: &str) -> Result<Vec<AlbumTrack>> {
        self.catalog_calls += 1;
        Ok(self.album_tracks.get(album_uri).cloned().unwrap_or_default())
    }
}

impl PlaylistService for FakeSpotify {
    fn playlist_items(&mut self, playlist_id: &str) -> Result<Vec<String>> {
        Ok(self
            .playlist_mut(playlist_id)?
            .iter()
            .filter(|uri| !uri.starts_with("spotify:local:"))
            .take(PLAYLIST_PAGE)
            .cloned()
            .collect())
    }

    fn playlist_len(&mut self, playlist_id: &str) -> Result<usize> {
        Ok(self.playlist_mut(playlist_id)?.len())
    }

    fn remove_items(&mut self, playlist_id: &str, uris: &[String]) -> Result<()> {
        assert!(uris.len() <= PLAYLIST_PAGE, "oversized removal of {}", uris.len());
        let doomed: HashSet<&String> = uris.iter().collect();
        self.playlist_mut(playlist_id)?.retain(|uri| !doomed.contains(uri));
        self.removed_batches.push(uris.len());
        Ok(())
    }

    fn add_items(&mut self, playlist_id: &str, uris: &[String]) -> Result<()> {
        assert!(uris.len() <= PLAYLIST_PAGE, "oversized addition of {}", uris.len());
        self.playlist_mut(playlist_id)?.extend_from_slice(uris);
        self.added_batches.push(uris.len());
        Ok(())
    }

    fn replace_items(&mut self, playlist_id: &str, uris: &[String]) -> Result<()> {
        assert!(uris.len() <= PLAYLIST_PAGE, "oversized replacement of {}", uris.len());
        *self.playlist_mut(playlist_id)? = uris.to_vec();
        self.replaced += 1;
        Ok(())
    }
}
