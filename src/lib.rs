pub mod allocator;
pub mod artist_cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gaps;
pub mod interrupt;
pub mod lastfm;
pub mod leaderboard;
pub mod logger;
pub mod names;
pub mod pipeline;
pub mod playlist;
pub mod rate_limiter;
pub mod resolver;
pub mod spotify;
pub mod state;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use allocator::allocate;
pub use artist_cache::{ArtistCache, ArtistTrackCacheEntry};
pub use catalog::{CatalogWindow, ScrobbleCatalogFetcher};
pub use config::{Credentials, Overrides, Settings, StatePaths, StealPolicy, TrackMode};
pub use error::{Error, Result};
pub use gaps::{farming_deficits, stealing_gaps, GapPolicy, StealPlan};
pub use interrupt::{CancelFlag, KeyboardWatcher, SignalAction, SignalHandler};
pub use lastfm::{LastFmClient, Period, RankingService};
pub use leaderboard::{ArtistScrobbleRecord, LeaderboardPage, ScrobbleMap};
pub use logger::{init_logger, level_filter};
pub use pipeline::{CrownClaimer, RunMode, RunOptions, RunSummary};
pub use playlist::PlaylistSyncer;
pub use resolver::{ArtistTrackResolver, Resolution, ResolverOptions};
pub use spotify::{MusicService, PlaylistService, SpotifyClient};
pub use state::{ArtistStore, ExclusionSets, RivalSnapshot, RunLog};
