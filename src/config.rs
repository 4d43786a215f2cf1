use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{Error, Result};
use crate::state::write_atomic;

/// Which track list an artist contributes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TrackMode {
    /// The service's curated top tracks (at most 10 per artist).
    Popular,
    /// Every track on every album, shortest first.
    Full,
}

impl fmt::Display for TrackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackMode::Popular => f.write_str("popular"),
            TrackMode::Full => f.write_str("full"),
        }
    }
}

/// How rival gaps are turned into steal candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StealPolicy {
    /// Any artist over the goal, including ones we have never played.
    RangeBounded,
    /// Only artists we already have at least one play on.
    OvertakeOnly,
}

impl fmt::Display for StealPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StealPolicy::RangeBounded => f.write_str("range-bounded"),
            StealPolicy::OvertakeOnly => f.write_str("overtake-only"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub log_level: String,
    pub lastfm_pause_ms: u64,
    pub spotify_pause_ms: u64,
    /// Genre filters. A plain entry matches any artist genre containing it,
    /// a `+`-prefixed entry must equal an artist genre.
    pub genres: Vec<String>,
    pub track_mode: TrackMode,
    pub market: String,
    pub search_limit: u32,
    pub page_size: u32,
    pub max_retries: u32,
    pub cache_refresh_days: u32,
    pub keyboard: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        GeneralSettings {
            log_level: "info".to_string(),
            lastfm_pause_ms: 250,
            spotify_pause_ms: 100,
            genres: Vec::new(),
            track_mode: TrackMode::Popular,
            market: "US".to_string(),
            search_limit: 10,
            page_size: 1000,
            max_retries: 5,
            cache_refresh_days: 0,
            keyboard: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmingSettings {
    pub active: bool,
    pub crown_goal: u64,
    pub playlist_length: usize,
    pub starting_page: u32,
    pub playlist_id: String,
}

impl Default for FarmingSettings {
    fn default() -> Self {
        FarmingSettings {
            active: true,
            crown_goal: 30,
            playlist_length: 500,
            starting_page: 1,
            playlist_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StealingSettings {
    pub active: bool,
    pub crown_goal: u64,
    pub playlist_length: usize,
    pub policy: StealPolicy,
    /// Only gaps up to `range_widths * crown_goal` are targeted; 0 means unbounded.
    pub range_widths: Option<u64>,
    pub reuse_days: i64,
    pub playlist_id: String,
}

impl Default for StealingSettings {
    fn default() -> Self {
        StealingSettings {
            active: true,
            crown_goal: 30,
            playlist_length: 500,
            policy: StealPolicy::RangeBounded,
            range_widths: Some(1),
            reuse_days: 7,
            playlist_id: String::new(),
        }
    }
}

/// Run settings, saved as `settings.toml` in the state directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub farming: FarmingSettings,
    pub stealing: StealingSettings,
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub farming_goal: Option<u64>,
    pub farming_length: Option<usize>,
    pub stealing_goal: Option<u64>,
    pub stealing_length: Option<usize>,
    pub policy: Option<StealPolicy>,
    pub track_mode: Option<TrackMode>,
    pub keyboard: Option<bool>,
}

impl Settings {
    /// Load settings, writing the defaults out when the file does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let settings = Settings::default();
            settings.save(path)?;
            log::info!("wrote default settings to {}", path.display());
            return Ok(settings);
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        write_atomic(path, toml_string.as_bytes())
    }

    pub fn validate(&self) -> Result<()> {
        if self.farming.crown_goal == 0 || self.stealing.crown_goal == 0 {
            return Err(Error::Config("crown_goal must be positive".into()));
        }
        if self.farming.playlist_length == 0 || self.stealing.playlist_length == 0 {
            return Err(Error::Config("playlist_length must be positive".into()));
        }
        if !(1..=1000).contains(&self.general.page_size) {
            return Err(Error::Config("page_size must be between 1 and 1000".into()));
        }
        if self.general.search_limit == 0 || self.general.search_limit > 50 {
            return Err(Error::Config("search_limit must be between 1 and 50".into()));
        }
        if self.farming.starting_page == 0 {
            return Err(Error::Config("starting_page counts from 1".into()));
        }
        if let Some(bad) = self
            .general
            .genres
            .iter()
            .find(|g| g.trim_start_matches('+').trim().is_empty())
        {
            return Err(Error::Config(format!("empty genre filter {bad:?}")));
        }
        Ok(())
    }

    /// Apply command-line values on top of the loaded file.
    pub fn merge(&mut self, other: &Overrides) {
        if let Some(goal) = other.farming_goal {
            self.farming.crown_goal = goal;
        }
        if let Some(length) = other.farming_length {
            self.farming.playlist_length = length;
        }
        if let Some(goal) = other.stealing_goal {
            self.stealing.crown_goal = goal;
        }
        if let Some(length) = other.stealing_length {
            self.stealing.playlist_length = length;
        }
        if let Some(policy) = other.policy {
            self.stealing.policy = policy;
        }
        if let Some(mode) = other.track_mode {
            self.general.track_mode = mode;
        }
        if let Some(keyboard) = other.keyboard {
            self.general.keyboard = keyboard;
        }
    }

    pub fn print(&self, title: &str) {
        println!("{}:", title);
        println!("  Log level:          {}", self.general.log_level);
        println!("  Last.fm pause:      {} ms", self.general.lastfm_pause_ms);
        println!("  Spotify pause:      {} ms", self.general.spotify_pause_ms);
        if self.general.genres.is_empty() {
            println!("  Genres:             (any)");
        } else {
            println!("  Genres:             {}", self.general.genres.join(", "));
        }
        println!("  Track mode:         {}", self.general.track_mode);
        println!("  Market:             {}", self.general.market);
        println!("  Ranking page size:  {}", self.general.page_size);
        println!("  Retry budget:       {}", self.general.max_retries);
        if self.general.cache_refresh_days == 0 {
            println!("  Cache refresh:      never");
        } else {
            println!("  Cache refresh:      every {} days", self.general.cache_refresh_days);
        }
        println!(
            "  Keyboard interrupt: {}",
            if self.general.keyboard { "enabled" } else { "disabled" }
        );
        println!();
        println!(
            "  Farming:            {} (goal {}, {} tracks, from page {})",
            if self.farming.active { "active" } else { "inactive" },
            self.farming.crown_goal,
            self.farming.playlist_length,
            self.farming.starting_page
        );
        println!(
            "  Stealing:           {} (goal {}, {} tracks, {}, reuse {} days)",
            if self.stealing.active { "active" } else { "inactive" },
            self.stealing.crown_goal,
            self.stealing.playlist_length,
            self.stealing.policy,
            self.stealing.reuse_days
        );
        match self.stealing.range_widths.filter(|w| *w > 0) {
            Some(widths) => println!(
                "  Steal window:       gaps up to {}",
                widths * self.stealing.crown_goal
            ),
            None => println!("  Steal window:       unbounded"),
        }
    }
}

/// API credentials, kept apart from the settings so the latter can be shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub lastfm_api_key: String,
    pub lastfm_username: String,
    /// A user access token with playlist-modify scope, obtained out of band.
    pub spotify_access_token: String,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingCredentials(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let credentials: Credentials = toml::from_str(&content)?;
        if credentials.lastfm_username.trim().is_empty() {
            return Err(Error::Config("lastfm_username is empty".into()));
        }
        Ok(credentials)
    }

    /// Write an empty credentials file for the operator to fill in, unless one exists.
    /// Returns whether a file was written.
    pub fn write_template(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        let template = Credentials {
            lastfm_api_key: String::new(),
            lastfm_username: String::new(),
            spotify_access_token: String::new(),
        };
        write_atomic(path, toml::to_string_pretty(&template)?.as_bytes())?;
        Ok(true)
    }
}

/// Locations of every file the tool reads or writes.
#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Use `dir` if given, else the platform data directory.
    pub fn resolve(dir: Option<PathBuf>) -> Result<Self> {
        let root = match dir {
            Some(dir) => dir,
            None => ProjectDirs::from("", "", "crowns")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| Error::Config("no home directory to keep state in".into()))?,
        };
        fs::create_dir_all(&root)?;
        Ok(StatePaths { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("settings.toml")
    }

    pub fn credentials(&self) -> PathBuf {
        self.root.join("credentials.toml")
    }

    pub fn artist_cache(&self) -> PathBuf {
        self.root.join("artist_cache.json")
    }

    pub fn blacklist(&self) -> PathBuf {
        self.root.join("blacklist_artists.txt")
    }

    pub fn failed_artists(&self) -> PathBuf {
        self.root.join("failed_artists.txt")
    }

    pub fn no_song_artists(&self) -> PathBuf {
        self.root.join("no_song_artists.txt")
    }

    pub fn rivals(&self) -> PathBuf {
        self.root.join("rivals.txt")
    }

    pub fn rival_snapshot(&self) -> PathBuf {
        self.root.join("rival_snapshot.json")
    }

    pub fn run_log(&self) -> PathBuf {
        self.root.join("run_log.json")
    }
}
