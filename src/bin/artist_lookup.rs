use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Datelike, Local};
use clap::Parser;

use crowns::config::{Credentials, Settings, StatePaths, TrackMode};
use crowns::logger::{init_logger, level_filter};
use crowns::names::search_candidates;
use crowns::rate_limiter::{Sleeper, ThreadSleeper};
use crowns::resolver::{ArtistTrackResolver, Resolution, ResolverOptions};
use crowns::spotify::SpotifyClient;
use crowns::state::ArtistStore;
use crowns::Result;

/// Resolve artist names to tracks the way a farming or stealing run would.
#[derive(Debug, Parser)]
#[command(name = "artist_lookup", version = env!("CARGO_PKG_VERSION"), about)]
struct Flags {
    /// Artist names as they appear on Last.fm
    #[clap(required = true)]
    artists: Vec<String>,
    /// Tracks to ask for per artist
    #[clap(long, default_value = "10")]
    plays: usize,
    #[clap(long, value_enum)]
    tracks: Option<TrackMode>,
    /// Only print the search queries that would be tried
    #[clap(long)]
    queries: bool,
    #[clap(long, value_hint = clap::ValueHint::DirPath)]
    state_dir: Option<PathBuf>,
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Flags::command().debug_assert();
}

fn print_resolution(artist: &str, resolution: &Resolution) {
    match resolution {
        Resolution::Tracks(tracks) => {
            println!("{artist}: {} tracks", tracks.len());
            for (i, track) in tracks.iter().enumerate() {
                println!("  {:>3}. {track}", i + 1);
            }
        }
        Resolution::GenreExcluded { genres } => {
            println!("{artist}: excluded by genre filter ({})", genres.join(", "));
        }
        Resolution::ArtistNotFound => println!("{artist}: not found"),
        Resolution::NoSongsFound => println!("{artist}: found, but no tracks credited to it"),
    }
}

fn run(flags: Flags) -> Result<()> {
    if flags.queries {
        for artist in &flags.artists {
            println!("{artist}:");
            for (strategy, query) in search_candidates(artist) {
                println!("  {strategy:<16} {query}");
            }
        }
        return Ok(());
    }

    let paths = StatePaths::resolve(flags.state_dir.clone())?;
    let settings = Settings::load_or_init(&paths.settings())?;
    init_logger(level_filter(&settings.general.log_level, flags.verbose));

    let credentials = Credentials::load(&paths.credentials())?;
    let mut store = ArtistStore::load(&paths)?;
    let general = &settings.general;
    let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);
    let mut music = SpotifyClient::new(
        &credentials.spotify_access_token,
        &general.market,
        general.spotify_pause_ms,
        general.max_retries,
        sleeper,
    );
    let resolver = ArtistTrackResolver::new(
        ResolverOptions {
            genres: general.genres.clone(),
            mode: flags.tracks.unwrap_or(general.track_mode),
            search_limit: general.search_limit,
            refresh_days: general.cache_refresh_days,
        },
        Local::now().ordinal(),
    );

    let mut result = Ok(());
    for artist in &flags.artists {
        match resolver.resolve(&mut music, &mut store.cache, artist, flags.plays) {
            Ok(resolution) => print_resolution(artist, &resolution),
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    store.flush()?;
    result
}

fn main() -> ExitCode {
    match run(Flags::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
