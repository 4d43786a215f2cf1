use std::io::Write;
use std::time::Instant;

/// Initializes console logging for the whole crate.
///
/// Functionality is provided by [`log`] with an `env_logger` backend.
/// If `RUST_LOG` isn't set, every other crate is silenced and ours logs at `filter`.
///
/// Lines end in `\r\n` so they stay aligned while the keyboard watcher keeps
/// the terminal in raw mode.
///
/// # Panics
/// This must only be called _once_.
pub fn init_logger(filter: log::LevelFilter) {
    let start = Instant::now();

    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| format!("off,crowns={filter},artist_lookup={filter}"));

    env_logger::Builder::new()
        .parse_filters(&filters)
        .format(move |buf, record| {
            let level = match record.level() {
                log::Level::Error => "E",
                log::Level::Warn => "W",
                log::Level::Info => "I",
                log::Level::Debug => "D",
                log::Level::Trace => "T",
            };
            let style = buf.default_level_style(record.level());
            let elapsed = start.elapsed();
            write!(
                buf,
                "| {style}{level}{style:#} | {:>4}.{:03}s | {:>20} @ {:<4} | {}\r\n",
                elapsed.as_secs(),
                elapsed.subsec_millis(),
                record.file().unwrap_or("???"),
                record.line().unwrap_or(0),
                record.args(),
            )
        })
        .write_style(env_logger::WriteStyle::Auto)
        .init();
}

/// Map `-v` counts on top of the configured level name.
pub fn level_filter(configured: &str, verbosity: u8) -> log::LevelFilter {
    let base = configured
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);
    match verbosity {
        0 => base,
        1 => base.max(log::LevelFilter::Info),
        2 => base.max(log::LevelFilter::Debug),
        _ => log::LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter("warn", 0), log::LevelFilter::Warn);
        assert_eq!(level_filter("warn", 1), log::LevelFilter::Info);
        assert_eq!(level_filter("error", 2), log::LevelFilter::Debug);
        assert_eq!(level_filter("info", 5), log::LevelFilter::Trace);
        assert_eq!(level_filter("nonsense", 0), log::LevelFilter::Info);
        assert_eq!(level_filter("debug", 1), log::LevelFilter::Debug);
    }
}
