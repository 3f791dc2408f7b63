use std::str::FromStr;

use tracing::metadata::LevelFilter;

/// Installs the global fmt subscriber, the level being read from `LOG_LEVEL`.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    });

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_ansi(true)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .init();
}
