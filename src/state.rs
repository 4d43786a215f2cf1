//! Files kept between runs: exclusion lists, the rival snapshot and the run log.
//!
//! Every write goes to a temporary file next to the target which is then
//! renamed over it, so an interrupted run never leaves a half-written file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::artist_cache::ArtistCache;
use crate::config::StatePaths;
use crate::error::{Error, Result};
use crate::leaderboard::ScrobbleMap;
use crate::pipeline::RunSummary;

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Read a one-name-per-line file. A missing file is created empty.
///
/// Blank lines and lines starting with `#` are ignored.
pub fn read_name_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        write_atomic(path, b"")?;
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

pub fn write_name_list<'a>(path: &Path, names: impl IntoIterator<Item = &'a String>) -> Result<()> {
    let mut content = String::new();
    for name in names {
        content.push_str(name);
        content.push('\n');
    }
    write_atomic(path, content.as_bytes())
}

/// Artists never to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSets {
    /// Opted out by hand. Only ever read.
    pub blacklist: BTreeSet<String>,
    /// No search strategy found the artist.
    pub failed: BTreeSet<String>,
    /// Found, but without a single usable track.
    pub no_songs: BTreeSet<String>,
}

impl ExclusionSets {
    pub fn load(paths: &StatePaths) -> Result<Self> {
        let sets = ExclusionSets {
            blacklist: read_name_list(&paths.blacklist())?.into_iter().collect(),
            failed: read_name_list(&paths.failed_artists())?.into_iter().collect(),
            no_songs: read_name_list(&paths.no_song_artists())?.into_iter().collect(),
        };
        log::debug!(
            "exclusions: {} blacklisted, {} failed, {} without songs",
            sets.blacklist.len(),
            sets.failed.len(),
            sets.no_songs.len()
        );
        Ok(sets)
    }

    /// Write the failed and no-song sets back.
    pub fn flush(&self, paths: &StatePaths) -> Result<()> {
        write_name_list(&paths.failed_artists(), &self.failed)?;
        write_name_list(&paths.no_song_artists(), &self.no_songs)
    }

    pub fn contains(&self, artist: &str) -> bool {
        self.blacklist.contains(artist) || self.failed.contains(artist) || self.no_songs.contains(artist)
    }
}

/// Artist cache plus exclusion sets: loaded once per run, flushed on every exit.
#[derive(Debug)]
pub struct ArtistStore {
    pub cache: ArtistCache,
    pub exclusions: ExclusionSets,
    paths: StatePaths,
}

impl ArtistStore {
    pub fn load(paths: &StatePaths) -> Result<Self> {
        Ok(ArtistStore {
            cache: ArtistCache::load(&paths.artist_cache())?,
            exclusions: ExclusionSets::load(paths)?,
            paths: paths.clone(),
        })
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    /// Persist the cache and the failed and no-song sets.
    pub fn flush(&mut self) -> Result<()> {
        let cache = self.cache.flush(&self.paths.artist_cache());
        let exclusions = self.exclusions.flush(&self.paths);
        cache.and(exclusions)
    }
}

/// Merged rival charts saved so the next steal run can skip refetching them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RivalSnapshot {
    /// Lowest playcount the rival charts were fetched down to.
    pub threshold: u64,
    /// Sorted rival usernames.
    pub roster: Vec<String>,
    pub saved_on: NaiveDate,
    pub scrobbles: BTreeMap<String, u64>,
}

impl RivalSnapshot {
    pub fn new(threshold: u64, roster: &[String], saved_on: NaiveDate, scrobbles: &ScrobbleMap) -> Self {
        RivalSnapshot {
            threshold,
            roster: sorted_roster(roster),
            saved_on,
            scrobbles: scrobbles.iter().map(|(a, n)| (a.to_string(), n)).collect(),
        }
    }

    /// `Ok(None)` when no snapshot was saved yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// A snapshot fetched down to a lower threshold holds every artist a
    /// higher one needs, so it can stand in for a fresh fetch.
    pub fn is_reusable(&self, threshold: u64, roster: &[String], today: NaiveDate, reuse_days: i64) -> bool {
        if self.roster != sorted_roster(roster) {
            log::debug!("rival snapshot was taken for a different roster");
            return false;
        }
        if self.threshold > threshold {
            log::debug!(
                "rival snapshot only covers playcounts from {}, need {}",
                self.threshold,
                threshold
            );
            return false;
        }
        let age = (today - self.saved_on).num_days();
        if age < 0 || age > reuse_days {
            log::debug!("rival snapshot is {} days old", age);
            return false;
        }
        true
    }

    pub fn scrobble_map(&self) -> ScrobbleMap {
        self.scrobbles.iter().map(|(a, n)| (a.as_str(), *n)).collect()
    }

    pub fn remove(&mut self, artist: &str) -> bool {
        self.scrobbles.remove(artist).is_some()
    }
}

fn sorted_roster(roster: &[String]) -> Vec<String> {
    let set: BTreeSet<String> = roster.iter().map(|r| r.trim().to_string()).collect();
    set.into_iter().filter(|r| !r.is_empty()).collect()
}

/// What the last run did, written as `run_log.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub date: NaiveDate,
    pub summary: RunSummary,
    /// Artists no search strategy found during this run.
    pub failed: Vec<String>,
    pub no_songs: Vec<String>,
    /// Genre → number of artists skipped for carrying it.
    pub genre_skips: BTreeMap<String, u32>,
}

impl RunLog {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn roster(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_name_list_created_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist_artists.txt");
        assert!(read_name_list(&path).unwrap().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_name_list_skips_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rivals.txt");
        fs::write(&path, "# rivals\nalice\n\n  bob  \n").unwrap();
        assert_eq!(read_name_list(&path).unwrap(), roster(&["alice", "bob"]));
    }

    #[test]
    fn test_exclusions_flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::resolve(Some(dir.path().to_path_buf())).unwrap();
        fs::write(paths.blacklist(), "Nickelback\n").unwrap();

        let mut sets = ExclusionSets::load(&paths).unwrap();
        assert!(sets.contains("Nickelback"));
        sets.failed.insert("Unfindable".into());
        sets.no_songs.insert("Silent".into());
        sets.flush(&paths).unwrap();

        let reloaded = ExclusionSets::load(&paths).unwrap();
        assert_eq!(reloaded, sets);
        assert_eq!(fs::read_to_string(paths.blacklist()).unwrap(), "Nickelback\n");
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rival_snapshot.json");
        assert_eq!(RivalSnapshot::load(&path).unwrap(), None);

        let map: ScrobbleMap = [("Abba", 40u64), ("Blur", 31)].into_iter().collect();
        let mut snapshot = RivalSnapshot::new(30, &roster(&["bob", "alice"]), date(2024, 3, 1), &map);
        assert!(snapshot.remove("Blur"));
        snapshot.save(&path).unwrap();

        let loaded = RivalSnapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded.roster, roster(&["alice", "bob"]));
        assert_eq!(loaded.scrobble_map().get("Abba"), Some(40));
        assert!(!loaded.scrobble_map().contains("Blur"));
    }

    #[test]
    fn test_snapshot_reuse_rules() {
        let map = ScrobbleMap::new();
        let snapshot = RivalSnapshot::new(30, &roster(&["alice", "bob"]), date(2024, 3, 1), &map);
        let today = date(2024, 3, 5);
        let rivals = roster(&["bob", "alice"]);

        assert!(snapshot.is_reusable(30, &rivals, today, 7));
        assert!(snapshot.is_reusable(50, &rivals, today, 7));
        assert!(!snapshot.is_reusable(20, &rivals, today, 7));
        assert!(!snapshot.is_reusable(30, &roster(&["alice"]), today, 7));
        assert!(!snapshot.is_reusable(30, &rivals, date(2024, 3, 9), 7));
        assert!(snapshot.is_reusable(30, &rivals, date(2024, 3, 8), 7));
        assert!(!snapshot.is_reusable(30, &rivals, date(2024, 2, 1), 7));
    }

    #[test]
    fn test_run_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_log.json");
        let log = RunLog {
            date: date(2024, 3, 1),
            summary: RunSummary {
                resolved: 3,
                tracks_queued: 12,
                ..RunSummary::default()
            },
            failed: roster(&["Unfindable"]),
            no_songs: Vec::new(),
            genre_skips: BTreeMap::from([("pop".to_string(), 2)]),
        };
        log.save(&path).unwrap();
        assert_eq!(RunLog::load(&path).unwrap(), log);
    }
}
