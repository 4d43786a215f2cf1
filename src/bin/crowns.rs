use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crowns::config::{Credentials, Overrides, Settings, StatePaths, StealPolicy, TrackMode};
use crowns::interrupt::{CancelFlag, KeyboardWatcher, SignalHandler};
use crowns::lastfm::LastFmClient;
use crowns::logger::{init_logger, level_filter};
use crowns::pipeline::{CrownClaimer, RunOptions, RunSummary};
use crowns::rate_limiter::{Sleeper, ThreadSleeper};
use crowns::spotify::SpotifyClient;
use crowns::state::{read_name_list, ArtistStore, ExclusionSets};
use crowns::{Error, Result};

/// Queue tracks that win Last.fm artist crowns.
#[derive(Debug, Parser)]
#[command(name = "crowns", version = env!("CARGO_PKG_VERSION"), about)]
struct Flags {
    /// Directory holding settings, credentials, caches and artist lists
    #[clap(long, global = true, value_hint = clap::ValueHint::DirPath)]
    state_dir: Option<PathBuf>,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Do not watch the keyboard for Esc/q
    #[clap(long, global = true)]
    no_keyboard: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Push our own artists over the crown goal
    Farm(RunArgs),
    /// Overtake rivals on artists they hold
    Steal(StealArgs),
    /// Every mode that is active in the settings
    Run(RunArgs),
    /// Print the effective settings
    ShowConfig,
    /// Write default settings, a credentials template and empty artist lists
    Init,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Crown goal (playcount threshold)
    #[clap(long)]
    goal: Option<u64>,
    /// Playlist length
    #[clap(long)]
    length: Option<usize>,
    /// Which tracks to queue per artist
    #[clap(long, value_enum)]
    tracks: Option<TrackMode>,
    /// Resolve and allocate without touching the playlist
    #[clap(long)]
    dry_run: bool,
    /// Add to the playlist instead of replacing it
    #[clap(long)]
    keep_existing: bool,
}

#[derive(Debug, Args)]
struct StealArgs {
    #[clap(flatten)]
    run: RunArgs,
    #[clap(long, value_enum)]
    policy: Option<StealPolicy>,
    /// Refetch rival charts even if the saved ones are recent enough
    #[clap(long)]
    refresh_rivals: bool,
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Flags::command().debug_assert();
}

impl RunArgs {
    fn options(&self, refresh_rivals: bool) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            keep_existing: self.keep_existing,
            refresh_rivals,
        }
    }
}

fn overrides(flags: &Flags) -> Overrides {
    let mut overrides = Overrides {
        keyboard: flags.no_keyboard.then_some(false),
        ..Overrides::default()
    };
    match &flags.command {
        Command::Farm(args) => {
            overrides.farming_goal = args.goal;
            overrides.farming_length = args.length;
            overrides.track_mode = args.tracks;
        }
        Command::Steal(args) => {
            overrides.stealing_goal = args.run.goal;
            overrides.stealing_length = args.run.length;
            overrides.track_mode = args.run.tracks;
            overrides.policy = args.policy;
        }
        Command::Run(args) => {
            overrides.farming_goal = args.goal;
            overrides.stealing_goal = args.goal;
            overrides.farming_length = args.length;
            overrides.stealing_length = args.length;
            overrides.track_mode = args.tracks;
        }
        Command::ShowConfig | Command::Init => {}
    }
    overrides
}

fn init(paths: &StatePaths) -> Result<()> {
    Settings::load_or_init(&paths.settings())?;
    ExclusionSets::load(paths)?;
    read_name_list(&paths.rivals())?;
    if Credentials::write_template(&paths.credentials())? {
        println!(
            "Fill in your API key, username and access token in {}",
            paths.credentials().display()
        );
    }
    println!("State directory ready at {}", paths.root().display());
    Ok(())
}

fn run(flags: Flags) -> Result<Vec<RunSummary>> {
    let paths = StatePaths::resolve(flags.state_dir.clone())?;
    if matches!(flags.command, Command::Init) {
        init(&paths)?;
        return Ok(Vec::new());
    }

    let mut settings = Settings::load_or_init(&paths.settings())?;
    settings.merge(&overrides(&flags));
    settings.validate()?;
    init_logger(level_filter(&settings.general.log_level, flags.verbose));

    if matches!(flags.command, Command::ShowConfig) {
        settings.print(&format!("Settings ({})", paths.settings().display()));
        return Ok(Vec::new());
    }

    let credentials = Credentials::load(&paths.credentials())?;
    let store = ArtistStore::load(&paths)?;
    let rivals = read_name_list(&paths.rivals())?;

    let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);
    let general = &settings.general;
    let ranking = LastFmClient::new(
        &credentials.lastfm_api_key,
        general.lastfm_pause_ms,
        general.max_retries,
        sleeper.clone(),
    );
    let music = SpotifyClient::new(
        &credentials.spotify_access_token,
        &general.market,
        general.spotify_pause_ms,
        general.max_retries,
        sleeper.clone(),
    );

    let cancel = CancelFlag::new();
    if let Err(e) = SignalHandler::new(cancel.clone()).install() {
        log::warn!("{}, an interrupt will not save state", e);
    }
    let watcher = if settings.general.keyboard {
        match KeyboardWatcher::spawn(cancel.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("keyboard shortcuts unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut claimer = CrownClaimer::new(ranking, music, settings, store, &credentials.lastfm_username)
        .with_rivals(rivals)
        .with_cancel(cancel)
        .with_sleeper(sleeper);

    let result = match &flags.command {
        Command::Farm(args) => claimer.farm(args.options(false)).map(|s| vec![s]),
        Command::Steal(args) => claimer
            .steal(args.run.options(args.refresh_rivals))
            .map(|s| vec![s]),
        Command::Run(args) => claimer.run_active(args.options(false)),
        Command::ShowConfig | Command::Init => Ok(Vec::new()),
    };

    // leave raw mode before anything is printed
    drop(watcher);
    result
}

fn main() -> ExitCode {
    let flags = Flags::parse();
    match run(flags) {
        Ok(summaries) => {
            for summary in summaries {
                println!("{summary}");
                println!();
            }
            ExitCode::SUCCESS
        }
        Err(Error::Cancelled) => {
            eprintln!("Stopped by operator, progress was saved.");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
