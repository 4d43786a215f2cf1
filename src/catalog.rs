//! Walks a user's top-artists chart and collects the artists whose playcount
//! falls in a window, requesting as few pages as possible.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::interrupt::CancelFlag;
use crate::lastfm::{Period, RankingService};
use crate::leaderboard::{LeaderboardPage, ScrobbleMap};
use crate::rate_limiter::Sleeper;
use crate::transport::backoff_delay;

/// Page-level retries on top of the transport's own, per page.
const PAGE_RETRIES: u32 = 8;

/// Whether a failed page request is a fault the service reported and may
/// clear up. Connection failures already spent the transport's retries.
fn page_retryable(error: &Error) -> bool {
    matches!(error, Error::Service { .. } | Error::Http { .. }) && error.is_transient()
}

/// Playcount window and stop conditions for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogWindow {
    /// Exclusive upper bound.
    pub max_scrobbles: u64,
    /// Inclusive lower bound.
    pub min_scrobbles: u64,
    /// Stop once this many artists were collected.
    pub min_artists: usize,
    pub starting_page: u32,
}

impl CatalogWindow {
    /// Every artist with at least one play.
    pub fn everything() -> Self {
        CatalogWindow {
            max_scrobbles: u64::MAX,
            min_scrobbles: 1,
            min_artists: usize::MAX,
            starting_page: 1,
        }
    }

    /// Every artist at or over `threshold`.
    pub fn at_least(threshold: u64) -> Self {
        CatalogWindow {
            min_scrobbles: threshold,
            ..Self::everything()
        }
    }
}

/// What a fetch collected and how much it cost.
#[derive(Debug, Clone, Default)]
pub struct CatalogFetch {
    pub scrobbles: ScrobbleMap,
    pub pages_requested: u32,
    /// First page that contained an artist inside the window.
    pub first_window_page: Option<u32>,
}

pub struct ScrobbleCatalogFetcher<'a, R: RankingService + ?Sized> {
    ranking: &'a mut R,
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancelFlag,
    page_size: u32,
}

impl<'a, R: RankingService + ?Sized> ScrobbleCatalogFetcher<'a, R> {
    pub fn new(ranking: &'a mut R, sleeper: &'a dyn Sleeper, cancel: &'a CancelFlag, page_size: u32) -> Self {
        ScrobbleCatalogFetcher {
            ranking,
            sleeper,
            cancel,
            page_size,
        }
    }

    /// Collect every artist of `username` with a playcount in
    /// `[min_scrobbles, max_scrobbles)`, stopping early at `min_artists`.
    ///
    /// Transient service faults are waited out and the same page is asked for
    /// again, up to [`PAGE_RETRIES`] times; every other error is returned.
    pub fn fetch(&mut self, username: &str, window: CatalogWindow) -> Result<CatalogFetch> {
        let mut result = CatalogFetch::default();
        let mut page_number = window.starting_page.max(1);

        log::info!(
            "fetching {}'s chart for playcounts in [{}, {}) from page {}",
            username,
            window.min_scrobbles,
            if window.max_scrobbles == u64::MAX {
                "∞".to_string()
            } else {
                window.max_scrobbles.to_string()
            },
            page_number
        );

        while result.scrobbles.len() < window.min_artists {
            self.cancel.check()?;

            let page = self.request_page(username, page_number)?;
            result.pages_requested += 1;

            let Some(lowest) = page.last_playcount() else {
                log::debug!("page {} is empty, chart exhausted", page_number);
                break;
            };

            if lowest >= window.max_scrobbles {
                log::debug!("page {} is entirely above the window", page_number);
            } else {
                let lower = page.first_under(window.max_scrobbles);
                let (upper, window_closed) = if lowest >= window.min_scrobbles {
                    (page.len(), false)
                } else {
                    (page.first_under(window.min_scrobbles).max(lower), true)
                };

                if lower < upper && result.first_window_page.is_none() {
                    result.first_window_page = Some(page_number);
                }
                for record in &page.records[lower..upper] {
                    result.scrobbles.insert_first(&record.artist_name, record.playcount);
                }
                log::debug!(
                    "page {}: took rows {}..{} ({} artists so far)",
                    page_number,
                    lower,
                    upper,
                    result.scrobbles.len()
                );

                if window_closed {
                    break;
                }
            }

            if page.total_pages.is_some_and(|total| page_number >= total)
                || page.len() < self.page_size as usize
            {
                break;
            }
            page_number += 1;
        }

        log::info!(
            "collected {} artists from {} page request(s)",
            result.scrobbles.len(),
            result.pages_requested
        );
        Ok(result)
    }

    fn request_page(&mut self, username: &str, page: u32) -> Result<LeaderboardPage> {
        let mut attempt = 0u32;
        loop {
            match self
                .ranking
                .get_top_artists(username, page, self.page_size, Period::Overall)
            {
                Ok(page) => return Ok(page),
                Err(e) if page_retryable(&e) && attempt < PAGE_RETRIES => {
                    attempt += 1;
                    let delay = backoff_delay(attempt).max(Duration::from_secs(1));
                    log::warn!(
                        "page {} of {}'s chart failed ({}), retrying in {}s",
                        page,
                        username,
                        e,
                        delay.as_secs()
                    );
                    self.sleeper.sleep(delay);
                    self.cancel.check()?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
