//! On-disk cache of artist lookups, keyed by the artist name as it appears
//! on the ranking service.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::TrackMode;
use crate::error::Result;
use crate::state::write_atomic;

const DAYS_PER_YEAR: i64 = 365;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistTrackCacheEntry {
    /// Music-service id of the matched artist.
    pub uri: Option<String>,
    /// The query that produced the match.
    pub search_name: String,
    /// Empty until fetched; afterwards never empty (see [`crate::names::NO_GENRE`]).
    pub genres: Vec<String>,
    pub popular_tracks: Option<Vec<String>>,
    /// Every album track, shortest first.
    pub full_tracks: Option<Vec<String>>,
    /// Day of year the entry was last filled.
    pub last_resolved: u32,
}

impl ArtistTrackCacheEntry {
    pub fn tracks(&self, mode: TrackMode) -> Option<&Vec<String>> {
        match mode {
            TrackMode::Popular => self.popular_tracks.as_ref(),
            TrackMode::Full => self.full_tracks.as_ref(),
        }
    }

    pub fn set_tracks(&mut self, mode: TrackMode, tracks: Vec<String>) {
        match mode {
            TrackMode::Popular => self.popular_tracks = Some(tracks),
            TrackMode::Full => self.full_tracks = Some(tracks),
        }
    }

    pub fn genres_known(&self) -> bool {
        !self.genres.is_empty()
    }

    /// Whether the track lists are at least `refresh_days` old. The age wraps
    /// at the year boundary. `0` disables refreshing.
    pub fn is_stale(&self, today: u32, refresh_days: u32) -> bool {
        if refresh_days == 0 {
            return false;
        }
        let age = (i64::from(today) - i64::from(self.last_resolved)).rem_euclid(DAYS_PER_YEAR);
        age >= i64::from(refresh_days)
    }

    /// Forget the track lists so they are fetched again from the stored uri.
    pub fn clear_tracks(&mut self) {
        self.popular_tracks = None;
        self.full_tracks = None;
    }
}

#[derive(Debug, Default)]
pub struct ArtistCache {
    entries: BTreeMap<String, ArtistTrackCacheEntry>,
    dirty: bool,
}

impl ArtistCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// An absent file is an empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let entries: BTreeMap<String, ArtistTrackCacheEntry> = serde_json::from_str(&content)?;
        log::debug!("loaded {} cached artists from {}", entries.len(), path.display());
        Ok(ArtistCache {
            entries,
            dirty: false,
        })
    }

    /// Write the cache if anything changed since it was loaded.
    pub fn flush(&mut self, path: &Path) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(path, json.as_bytes())?;
        self.dirty = false;
        log::debug!("saved {} cached artists", self.entries.len());
        Ok(())
    }

    pub fn get(&self, artist: &str) -> Option<&ArtistTrackCacheEntry> {
        self.entries.get(artist)
    }

    pub fn insert(&mut self, artist: &str, entry: ArtistTrackCacheEntry) {
        self.entries.insert(artist.to_string(), entry);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
