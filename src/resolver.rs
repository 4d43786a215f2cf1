//! Artist name → playable track ids, through the cache or a search.

use std::collections::HashSet;

use crate::artist_cache::{ArtistCache, ArtistTrackCacheEntry};
use crate::config::TrackMode;
use crate::error::{Error, Result};
use crate::names::{genre_allowed, name_key, normalize_genres, search_candidates};
use crate::spotify::MusicService;

/// Outcome of resolving one artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Up to `plays_needed` track ids, best first.
    Tracks(Vec<String>),
    GenreExcluded { genres: Vec<String> },
    ArtistNotFound,
    NoSongsFound,
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub genres: Vec<String>,
    pub mode: TrackMode,
    pub search_limit: u32,
    /// Days after which cached track lists are fetched again, 0 for never.
    pub refresh_days: u32,
}

pub struct ArtistTrackResolver {
    options: ResolverOptions,
    /// Day of year stamped on new entries.
    today: u32,
}

impl ArtistTrackResolver {
    pub fn new(options: ResolverOptions, today: u32) -> Self {
        ArtistTrackResolver { options, today }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve `artist` into at most `plays_needed` tracks.
    ///
    /// Per-artist dead ends come back as [`Resolution`] variants. An `Err` is
    /// a service failure that should end the whole resolution pass.
    pub fn resolve<M: MusicService + ?Sized>(
        &self,
        music: &mut M,
        cache: &mut ArtistCache,
        artist: &str,
        plays_needed: usize,
    ) -> Result<Resolution> {
        let mode = self.options.mode;

        if let Some(cached) = cache.get(artist) {
            if cached.genres_known() && !genre_allowed(&self.options.genres, &cached.genres) {
                return Ok(Resolution::GenreExcluded {
                    genres: cached.genres.clone(),
                });
            }
            let stale = cached.is_stale(self.today, self.options.refresh_days);
            if !stale {
                if let Some(tracks) = cached.tracks(mode) {
                    log::debug!("{}: {} cached {} tracks", artist, tracks.len(), mode);
                    return Ok(take_tracks(tracks, plays_needed));
                }
            }
            if let Some(uri) = cached.uri.clone() {
                let mut entry = cached.clone();
                if stale {
                    log::debug!("{}: cached tracks are stale, refreshing", artist);
                    entry.clear_tracks();
                }
                let tracks = self.fetch_tracks(music, artist, &uri, &entry.search_name)?;
                entry.set_tracks(mode, tracks);
                entry.last_resolved = self.today;
                let resolution = entry
                    .tracks(mode)
                    .map(|tracks| take_tracks(tracks, plays_needed))
                    .unwrap_or(Resolution::NoSongsFound);
                cache.insert(artist, entry);
                return Ok(resolution);
            }
        }

        for (strategy, candidate) in search_candidates(artist) {
            let hits = music
                .search_artist(&candidate, self.options.search_limit)
                .map_err(|e| Error::search(artist, e))?;
            let wanted = name_key(&candidate);
            let Some(hit) = hits.into_iter().find(|hit| name_key(&hit.name) == wanted) else {
                log::trace!("{}: no exact match for {:?}", artist, candidate);
                continue;
            };
            log::debug!("{}: matched {:?} via {} search", artist, hit.name, strategy);

            let mut entry = ArtistTrackCacheEntry {
                uri: Some(hit.uri.clone()),
                search_name: candidate,
                genres: normalize_genres(hit.genres),
                popular_tracks: None,
                full_tracks: None,
                last_resolved: self.today,
            };

            if !genre_allowed(&self.options.genres, &entry.genres) {
                let genres = entry.genres.clone();
                cache.insert(artist, entry);
                return Ok(Resolution::GenreExcluded { genres });
            }

            let tracks = self.fetch_tracks(music, artist, &hit.uri, &entry.search_name)?;
            let resolution = take_tracks(&tracks, plays_needed);
            entry.set_tracks(mode, tracks);
            cache.insert(artist, entry);
            return Ok(resolution);
        }

        Ok(Resolution::ArtistNotFound)
    }

    /// Tracks of `uri` in the configured mode, credited to `search_name` first.
    fn fetch_tracks<M: MusicService + ?Sized>(
        &self,
        music: &mut M,
        artist: &str,
        uri: &str,
        search_name: &str,
    ) -> Result<Vec<String>> {
        let key = name_key(search_name);
        let tracks = match self.options.mode {
            TrackMode::Popular => music
                .popular_tracks(uri)
                .map_err(|e| Error::search(artist, e))?
                .into_iter()
                .filter(|t| name_key(&t.artist) == key)
                .map(|t| t.uri)
                .collect(),
            TrackMode::Full => {
                let mut all = Vec::new();
                for album in music.albums(uri).map_err(|e| Error::search(artist, e))? {
                    all.extend(
                        music
                            .album_tracks(&album)
                            .map_err(|e| Error::search(artist, e))?
                            .into_iter()
                            .filter(|t| name_key(&t.artist) == key),
                    );
                }
                let mut seen = HashSet::new();
                all.retain(|t| seen.insert(t.name.trim().to_lowercase()));
                all.sort_by_key(|t| t.duration_ms);
                all.into_iter().map(|t| t.uri).collect()
            }
        };
        Ok(tracks)
    }
}

fn take_tracks(tracks: &[String], plays_needed: usize) -> Resolution {
    if tracks.is_empty() {
        Resolution::NoSongsFound
    } else {
        Resolution::Tracks(tracks.iter().take(plays_needed).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NO_GENRE;
    use crate::spotify::TrackRef;
    use crate::test_support::{album_track, FakeSpotify};
    use pretty_assertions::assert_eq;

    fn resolver(genres: &[&str], mode: TrackMode) -> ArtistTrackResolver {
        ArtistTrackResolver::new(
            ResolverOptions {
                genres: genres.iter().map(|g| g.to_string()).collect(),
                mode,
                search_limit: 10,
                refresh_days: 0,
            },
            100,
        )
    }

    fn tracks(resolution: Resolution) -> Vec<String> {
        match resolution {
            Resolution::Tracks(tracks) => tracks,
            other => panic!("expected tracks, got {other:?}"),
        }
    }

    #[test]
    fn test_warm_cache_is_idempotent() {
        let mut music = FakeSpotify::new().artist("Abba", &["europop"], 10);
        let mut cache = ArtistCache::new();
        let resolver = resolver(&[], TrackMode::Popular);

        let first = resolver.resolve(&mut music, &mut cache, "Abba", 4).unwrap();
        let searches = music.search_calls.len();
        let catalog = music.catalog_calls;
        let second = resolver.resolve(&mut music, &mut cache, "Abba", 4).unwrap();

        assert_eq!(first, second);
        assert_eq!(tracks(first).len(), 4);
        assert_eq!(music.search_calls.len(), searches);
        assert_eq!(music.catalog_calls, catalog);
    }

    #[test]
    fn test_plays_needed_bounds_output() {
        let mut music = FakeSpotify::new().artist("Abba", &["europop"], 10);
        let mut cache = ArtistCache::new();
        let resolver = resolver(&[], TrackMode::Popular);
        assert_eq!(tracks(resolver.resolve(&mut music, &mut cache, "Abba", 3).unwrap()).len(), 3);
        assert_eq!(tracks(resolver.resolve(&mut music, &mut cache, "Abba", 30).unwrap()).len(), 10);
    }

    #[test]
    fn test_ampersand_strategy_finds_artist() {
        let mut music = FakeSpotify::new().artist("Simon & Garfunkel", &["folk rock"], 5);
        let mut cache = ArtistCache::new();
        let resolver = resolver(&[], TrackMode::Popular);

        let result = resolver
            .resolve(&mut music, &mut cache, "Simon and Garfunkel", 2)
            .unwrap();
        assert_eq!(tracks(result).len(), 2);
        assert_eq!(music.search_calls, vec!["Simon and Garfunkel", "Simon & Garfunkel"]);
        assert_eq!(cache.get("Simon and Garfunkel").unwrap().search_name, "Simon & Garfunkel");
    }

    #[test]
    fn test_partial_match_is_never_accepted() {
        let mut music = FakeSpotify::new().artist("Abba Teens", &["pop"], 5);
        let mut cache = ArtistCache::new();
        let resolver = resolver(&[], TrackMode::Popular);

        let result = resolver.resolve(&mut music, &mut cache, "Abba", 5).unwrap();
        assert_eq!(result, Resolution::ArtistNotFound);
        assert_eq!(music.search_calls.len(), search_candidates("Abba").len());
        assert!(cache.get("Abba").is_none());
    }

    #[test]
    fn test_genre_exclusion_is_cached() {
        let mut music = FakeSpotify::new().artist("Abba", &["europop"], 5);
        let mut cache = ArtistCache::new();
        let metal_only = resolver(&["metal"], TrackMode::Popular);

        let result = metal_only.resolve(&mut music, &mut cache, "Abba", 5).unwrap();
        assert_eq!(
            result,
            Resolution::GenreExcluded {
                genres: vec!["europop".into()]
            }
        );
        assert_eq!(music.catalog_calls, 0);

        let searches = music.search_calls.len();
        let again = metal_only.resolve(&mut music, &mut cache, "Abba", 5).unwrap();
        assert!(matches!(again, Resolution::GenreExcluded { .. }));
        assert_eq!(music.search_calls.len(), searches);

        // a changed filter re-evaluates the cached genres and fetches the tracks
        let pop = resolver(&["pop"], TrackMode::Popular);
        let result = pop.resolve(&mut music, &mut cache, "Abba", 5).unwrap();
        assert_eq!(tracks(result).len(), 5);
        assert_eq!(music.search_calls.len(), searches);
    }

    #[test]
    fn test_missing_genres_become_sentinel() {
        let mut music = FakeSpotify::new().artist("Obscure", &[], 2);
        let mut cache = ArtistCache::new();
        let resolver = resolver(&[], TrackMode::Popular);
        resolver.resolve(&mut music, &mut cache, "Obscure", 2).unwrap();
        assert_eq!(cache.get("Obscure").unwrap().genres, vec![NO_GENRE.to_string()]);
    }

    #[test]
    fn test_foreign_tracks_are_filtered_out() {
        let mut music = FakeSpotify::new().artist_with_tracks(
            "Abba",
            &["europop"],
            vec![
                TrackRef {
                    uri: "spotify:track:cover".into(),
                    artist: "Tribute Band".into(),
                },
                TrackRef {
                    uri: "spotify:track:waterloo".into(),
                    artist: "ABBA".into(),
                },
            ],
        );
        let mut cache = ArtistCache::new();
        let resolver = resolver(&[], TrackMode::Popular);
        let result = resolver.resolve(&mut music, &mut cache, "Abba", 5).unwrap();
        assert_eq!(tracks(result), vec!["spotify:track:waterloo"]);
    }

    #[test]
    fn test_no_songs_found() {
        let mut music = FakeSpotify::new().artist_with_tracks(
            "Abba",
            &["europop"],
            vec![TrackRef {
                uri: "spotify:track:cover".into(),
                artist: "Tribute Band".into(),
            }],
        );
        let mut cache = ArtistCache::new();
        let resolver = resolver(&[], TrackMode::Popular);
        let result = resolver.resolve(&mut music, &mut cache, "Abba", 5).unwrap();
        assert_eq!(result, Resolution::NoSongsFound);
        assert_eq!(cache.get("Abba").unwrap().popular_tracks, Some(Vec::new()));
    }

    #[test]
    fn test_full_mode_dedupes_and_sorts_by_duration() {
        let mut music = FakeSpotify::new()
            .artist("Kent", &["swedish rock"], 0)
            .album(
                "Kent",
                vec![
                    album_track("spotify:track:a", "Musik non stop", "Kent", 250_000),
                    album_track("spotify:track:b", "Kräm", "Kent", 200_000),
                    album_track("spotify:track:x", "Guest Track", "Someone Else", 10_000),
                ],
            )
            .album(
                "Kent",
                vec![
                    album_track("spotify:track:c", "Musik Non Stop", "Kent", 100_000),
                    album_track("spotify:track:d", "747", "Kent", 400_000),
                ],
            );
        let mut cache = ArtistCache::new();
        let resolver = resolver(&[], TrackMode::Full);
        let result = resolver.resolve(&mut music, &mut cache, "Kent", 10).unwrap();
        assert_eq!(
            tracks(result),
            vec!["spotify:track:b", "spotify:track:a", "spotify:track:d"]
        );
    }

    #[test]
    fn test_second_mode_reuses_stored_uri() {
        let mut music = FakeSpotify::new()
            .artist("Kent", &["swedish rock"], 3)
            .album("Kent", vec![album_track("spotify:track:a", "Kräm", "Kent", 1)]);
        let mut cache = ArtistCache::new();
        resolver(&[], TrackMode::Popular)
            .resolve(&mut music, &mut cache, "Kent", 3)
            .unwrap();
        let searches = music.search_calls.len();

        let result = resolver(&[], TrackMode::Full)
            .resolve(&mut music, &mut cache, "Kent", 3)
            .unwrap();
        assert_eq!(tracks(result), vec!["spotify:track:a"]);
        assert_eq!(music.search_calls.len(), searches);
        let entry = cache.get("Kent").unwrap();
        assert_eq!(entry.popular_tracks.as_ref().map(Vec::len), Some(3));
        assert_eq!(entry.full_tracks.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_stale_entry_is_refetched_without_search() {
        let mut music = FakeSpotify::new().artist("Abba", &["europop"], 4);
        let mut cache = ArtistCache::new();
        cache.insert(
            "Abba",
            ArtistTrackCacheEntry {
                uri: Some(music.uri_of("Abba")),
                search_name: "Abba".into(),
                genres: vec!["europop".into()],
                popular_tracks: Some(vec!["spotify:track:gone".into()]),
                full_tracks: None,
                last_resolved: 80,
            },
        );
        let resolver = ArtistTrackResolver::new(
            ResolverOptions {
                genres: Vec::new(),
                mode: TrackMode::Popular,
                search_limit: 10,
                refresh_days: 7,
            },
            100,
        );
        let result = tracks(resolver.resolve(&mut music, &mut cache, "Abba", 10).unwrap());
        assert_eq!(result.len(), 4);
        assert!(!result.contains(&"spotify:track:gone".to_string()));
        assert!(music.search_calls.is_empty());
        assert_eq!(cache.get("Abba").unwrap().last_resolved, 100);
    }

    #[test]
    fn test_search_failure_is_fatal() {
        let mut music = FakeSpotify::new()
            .artist("Abba", &["europop"], 4)
            .fail_search("Abba");
        let mut cache = ArtistCache::new();
        let err = resolver(&[], TrackMode::Popular)
            .resolve(&mut music, &mut cache, "Abba", 4)
            .unwrap_err();
        assert!(matches!(err, Error::Search { ref artist, .. } if artist == "Abba"));
    }
}
