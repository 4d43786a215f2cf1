//! Farming and stealing runs: chart fetch → gaps → resolution → allocation →
//! playlist sync.
//!
//! State is flushed on every way out of a run, including cancellation and
//! service failures, so nothing resolved so far is lost.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::allocator::allocate;
use crate::catalog::{CatalogWindow, ScrobbleCatalogFetcher};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::gaps::{cheapest_first, farming_deficits, merge_rivals, stealing_gaps, GapPolicy};
use crate::interrupt::CancelFlag;
use crate::lastfm::RankingService;
use crate::leaderboard::ScrobbleMap;
use crate::playlist::PlaylistSyncer;
use crate::rate_limiter::{Sleeper, ThreadSleeper};
use crate::resolver::{ArtistTrackResolver, Resolution, ResolverOptions};
use crate::spotify::{MusicService, PlaylistService};
use crate::state::{ArtistStore, RivalSnapshot, RunLog};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    Farm,
    Steal,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Farm => f.write_str("farming"),
            RunMode::Steal => f.write_str("stealing"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Resolve and allocate, but leave the playlist alone.
    pub dry_run: bool,
    /// Append after the current playlist contents instead of replacing them.
    pub keep_existing: bool,
    /// Refetch rival charts even when the saved snapshot could be reused.
    pub refresh_rivals: bool,
}

/// Counts reported at the end of every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub resolved: usize,
    pub genre_skipped: usize,
    pub not_found: usize,
    pub no_songs: usize,
    pub tracks_queued: usize,
    pub removed: usize,
    /// Why the run stopped early, if it did.
    pub aborted: Option<String>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} summary:", self.mode)?;
        writeln!(f, "  Artists resolved:   {}", self.resolved)?;
        writeln!(f, "  Genre skipped:      {}", self.genre_skipped)?;
        writeln!(f, "  Not found:          {}", self.not_found)?;
        writeln!(f, "  Without songs:      {}", self.no_songs)?;
        writeln!(f, "  Tracks queued:      {}", self.tracks_queued)?;
        write!(f, "  Tracks removed:     {}", self.removed)?;
        if let Some(reason) = &self.aborted {
            write!(f, "\n  Stopped early:      {}", reason)?;
        }
        Ok(())
    }
}

/// Everything a run records besides the summary counts.
#[derive(Debug, Default)]
struct RunTally {
    summary: RunSummary,
    failed: Vec<String>,
    no_songs: Vec<String>,
    genre_skips: BTreeMap<String, u32>,
}

impl RunTally {
    fn new(mode: RunMode) -> Self {
        RunTally {
            summary: RunSummary {
                mode,
                ..RunSummary::default()
            },
            ..RunTally::default()
        }
    }
}

/// Where a batch of targets goes.
struct ClaimTarget<'a> {
    playlist_id: &'a str,
    capacity: usize,
}

pub struct CrownClaimer<R: RankingService, S: MusicService + PlaylistService> {
    ranking: R,
    music: S,
    settings: Settings,
    store: ArtistStore,
    username: String,
    rivals: Vec<String>,
    cancel: CancelFlag,
    sleeper: Arc<dyn Sleeper>,
    today: NaiveDate,
    /// Rival charts to write back when the run ends.
    snapshot: Option<RivalSnapshot>,
}

impl<R: RankingService, S: MusicService + PlaylistService> CrownClaimer<R, S> {
    pub fn new(ranking: R, music: S, settings: Settings, store: ArtistStore, username: &str) -> Self {
        CrownClaimer {
            ranking,
            music,
            settings,
            store,
            username: username.to_string(),
            rivals: Vec::new(),
            cancel: CancelFlag::new(),
            sleeper: Arc::new(ThreadSleeper),
            today: Local::now().date_naive(),
            snapshot: None,
        }
    }

    pub fn with_rivals(mut self, rivals: Vec<String>) -> Self {
        self.rivals = rivals;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn store(&self) -> &ArtistStore {
        &self.store
    }

    pub fn music(&self) -> &S {
        &self.music
    }

    pub fn ranking(&self) -> &R {
        &self.ranking
    }

    /// Queue tracks for our own artists that are just short of the crown goal.
    pub fn farm(&mut self, options: RunOptions) -> Result<RunSummary> {
        let mut tally = RunTally::new(RunMode::Farm);
        let result = self.farm_inner(options, &mut tally);
        self.finish(tally, result)
    }

    /// Queue tracks for artists where a rival is ahead of us by a closable gap.
    pub fn steal(&mut self, options: RunOptions) -> Result<RunSummary> {
        let mut tally = RunTally::new(RunMode::Steal);
        let result = self.steal_inner(options, &mut tally);
        self.finish(tally, result)
    }

    /// Every mode marked active in the settings, farming first.
    pub fn run_active(&mut self, options: RunOptions) -> Result<Vec<RunSummary>> {
        let mut summaries = Vec::new();
        if self.settings.farming.active {
            summaries.push(self.farm(options)?);
        }
        if self.settings.stealing.active {
            summaries.push(self.steal(options)?);
        }
        if summaries.is_empty() {
            log::warn!("neither farming nor stealing is active, nothing to do");
        }
        Ok(summaries)
    }

    fn farm_inner(&mut self, options: RunOptions, tally: &mut RunTally) -> Result<()> {
        let farming = self.settings.farming.clone();
        require_playlist(&farming.playlist_id, "farming", options)?;

        let window = CatalogWindow {
            max_scrobbles: farming.crown_goal,
            min_scrobbles: 1,
            min_artists: farming.playlist_length,
            starting_page: farming.starting_page,
        };
        let username = self.username.clone();
        let own = self.fetch_catalog(&username, window)?;

        let deficits = farming_deficits(&own, farming.crown_goal, &self.store.exclusions);
        log::info!(
            "{} of {} artists under {} plays can be farmed",
            deficits.len(),
            own.len(),
            farming.crown_goal
        );

        let target = ClaimTarget {
            playlist_id: &farming.playlist_id,
            capacity: farming.playlist_length,
        };
        self.claim(cheapest_first(&deficits), target, options, tally)
    }

    fn steal_inner(&mut self, options: RunOptions, tally: &mut RunTally) -> Result<()> {
        let stealing = self.settings.stealing.clone();
        require_playlist(&stealing.playlist_id, "stealing", options)?;
        if self.rivals.is_empty() {
            return Err(Error::Config("no rivals listed, add usernames to rivals.txt".into()));
        }

        let threshold = stealing.crown_goal;
        let snapshot = self.rival_snapshot(threshold, stealing.reuse_days, options.refresh_rivals)?;
        let rivals = snapshot.scrobble_map();
        self.snapshot = Some(snapshot);

        let username = self.username.clone();
        let own = self.fetch_catalog(&username, CatalogWindow::everything())?;

        let policy = GapPolicy::new(stealing.policy, threshold, stealing.range_widths);
        let plan = stealing_gaps(&rivals, &own, threshold, policy, &self.store.exclusions);
        if let Some(snapshot) = self.snapshot.as_mut() {
            for artist in &plan.secured {
                snapshot.remove(artist);
            }
        }
        log::info!(
            "{} steal candidates, {} crowns already secured",
            plan.candidates.len(),
            plan.secured.len()
        );

        let target = ClaimTarget {
            playlist_id: &stealing.playlist_id,
            capacity: stealing.playlist_length,
        };
        self.claim(plan.candidates, target, options, tally)
    }

    fn fetch_catalog(&mut self, username: &str, window: CatalogWindow) -> Result<ScrobbleMap> {
        let page_size = self.settings.general.page_size;
        let mut fetcher =
            ScrobbleCatalogFetcher::new(&mut self.ranking, self.sleeper.as_ref(), &self.cancel, page_size);
        Ok(fetcher.fetch(username, window)?.scrobbles)
    }

    fn rival_snapshot(&mut self, threshold: u64, reuse_days: i64, refresh: bool) -> Result<RivalSnapshot> {
        let path = self.store.paths().rival_snapshot();
        if !refresh {
            match RivalSnapshot::load(&path) {
                Ok(Some(saved)) if saved.is_reusable(threshold, &self.rivals, self.today, reuse_days) => {
                    log::info!(
                        "reusing rival charts from {} ({} artists)",
                        saved.saved_on,
                        saved.scrobbles.len()
                    );
                    return Ok(saved);
                }
                Ok(_) => {}
                Err(e) => log::warn!("ignoring unreadable rival snapshot: {}", e),
            }
        }

        let mut charts = Vec::with_capacity(self.rivals.len());
        for rival in self.rivals.clone() {
            let chart = self.fetch_catalog(&rival, CatalogWindow::at_least(threshold))?;
            log::info!("{} has {} artists at {}+ plays", rival, chart.len(), threshold);
            charts.push(chart);
        }
        let merged = merge_rivals(&charts);
        Ok(RivalSnapshot::new(threshold, &self.rivals, self.today, &merged))
    }

    /// Resolve `targets` in order, allocate, then sync the playlist.
    fn claim(
        &mut self,
        targets: Vec<(String, u64)>,
        target: ClaimTarget<'_>,
        options: RunOptions,
        tally: &mut RunTally,
    ) -> Result<()> {
        let already_used = if options.keep_existing && !target.playlist_id.is_empty() {
            self.music.playlist_len(target.playlist_id)?
        } else {
            0
        };
        let headroom = target.capacity.saturating_sub(already_used);

        let general = &self.settings.general;
        let resolver = ArtistTrackResolver::new(
            ResolverOptions {
                genres: general.genres.clone(),
                mode: general.track_mode,
                search_limit: general.search_limit,
                refresh_days: general.cache_refresh_days,
            },
            self.today.ordinal(),
        );

        let mut resolved: Vec<(String, Vec<String>)> = Vec::new();
        let mut collected = 0;
        for (artist, plays_needed) in targets {
            if collected >= headroom {
                log::debug!("collected {} tracks, enough for {} free slots", collected, headroom);
                break;
            }
            self.cancel.check()?;

            let plays_needed = usize::try_from(plays_needed).unwrap_or(usize::MAX);
            match resolver.resolve(&mut self.music, &mut self.store.cache, &artist, plays_needed) {
                Ok(Resolution::Tracks(tracks)) => {
                    log::info!("{}: {} tracks for {} plays", artist, tracks.len(), plays_needed);
                    tally.summary.resolved += 1;
                    collected += tracks.len();
                    resolved.push((artist, tracks));
                }
                Ok(Resolution::GenreExcluded { genres }) => {
                    log::debug!("{}: skipped for genres {}", artist, genres.join(", "));
                    tally.summary.genre_skipped += 1;
                    for genre in genres {
                        *tally.genre_skips.entry(genre).or_default() += 1;
                    }
                }
                Ok(Resolution::ArtistNotFound) => {
                    log::warn!("{}: not found", artist);
                    tally.summary.not_found += 1;
                    self.store.exclusions.failed.insert(artist.clone());
                    tally.failed.push(artist);
                }
                Ok(Resolution::NoSongsFound) => {
                    log::warn!("{}: no usable tracks", artist);
                    tally.summary.no_songs += 1;
                    self.store.exclusions.no_songs.insert(artist.clone());
                    tally.no_songs.push(artist);
                }
                Err(e @ Error::Search { .. }) => {
                    log::error!("{}, no further artists will be resolved", e);
                    tally.summary.aborted = Some(e.to_string());
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let tracks = allocate(&resolved, target.capacity, already_used);
        tally.summary.tracks_queued = tracks.len();

        if options.dry_run {
            log::info!("dry run, {} tracks not written to the playlist", tracks.len());
            return Ok(());
        }

        self.cancel.check()?;
        let mut syncer = PlaylistSyncer::new(&mut self.music);
        if !options.keep_existing {
            tally.summary.removed = syncer.empty(target.playlist_id)?;
        }
        syncer.populate(target.playlist_id, &tracks)?;
        Ok(())
    }

    /// Flush state and write the run log whatever `result` is.
    fn finish(&mut self, mut tally: RunTally, result: Result<()>) -> Result<RunSummary> {
        if let Err(e) = &result {
            tally.summary.aborted.get_or_insert_with(|| e.to_string());
        }

        let mut flushed = self.store.flush();
        if let Some(snapshot) = self.snapshot.take() {
            flushed = flushed.and(snapshot.save(&self.store.paths().rival_snapshot()));
        }

        let run_log = RunLog {
            date: self.today,
            summary: tally.summary.clone(),
            failed: tally.failed,
            no_songs: tally.no_songs,
            genre_skips: tally.genre_skips,
        };
        if let Err(e) = run_log.save(&self.store.paths().run_log()) {
            log::warn!("could not write run log: {}", e);
        }

        match (result, flushed) {
            (Err(e), Err(flush_error)) => {
                log::error!("could not save state: {}", flush_error);
                log::warn!("{}", tally.summary);
                Err(e)
            }
            (Err(e), Ok(())) => {
                log::warn!("{}", tally.summary);
                Err(e)
            }
            (Ok(()), Err(flush_error)) => Err(flush_error),
            (Ok(()), Ok(())) => Ok(tally.summary),
        }
    }
}

fn require_playlist(playlist_id: &str, mode: &str, options: RunOptions) -> Result<()> {
    if playlist_id.trim().is_empty() && !options.dry_run {
        return Err(Error::Config(format!("no playlist_id configured for {mode}")));
    }
    Ok(())
}
