use chrono::{Local, Utc};
use fern::Dispatch;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use std::fs;
use std::path::PathBuf;

const DEFAULT_LOG_DIR: &str = "logs";

/// Initializes the global logger: a compact colored console sink at the
/// `RUST_LOG` level (default `info`) and a date-stamped file under
/// `BOOKING_LOG_DIR` (default `logs/`).
///
/// The file sink always records at debug, so selector probes, cache
/// invalidations and retry schedules are on disk for post-mortems without
/// flooding the console. Correlation ids arrive inside the messages via
/// `RequestContext::tag`. Call once at the top of `main`.
pub fn init() {
    let console_level = std::env::var("RUST_LOG").ok().and_then(|level| level.parse::<LevelFilter>().ok()).unwrap_or(LevelFilter::Info);
    let log_dir = std::env::var("BOOKING_LOG_DIR").unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string());

    if let Err(error) = fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory '{}': {}", log_dir, error);
    }

    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::BrightBlack);

    let console = Dispatch::new()
        .level(console_level)
        .format(move |out, message, record| {
            out.finish(format_args!("{} {:>5} {}", Local::now().format("%H:%M:%S"), colors.color(record.level()), message))
        })
        .chain(std::io::stderr());

    // One file per calendar day; a booking run three weeks out is usually
    // diagnosed days after it happened.
    let file_path = PathBuf::from(&log_dir).join(format!("booking-{}.log", Local::now().format("%Y-%m-%d")));
    let (file, file_open) = match fern::log_file(&file_path) {
        Ok(sink) => (
            Dispatch::new()
                .level(LevelFilter::Debug)
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{} [{:>5}] {}: {}",
                        Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                        record.level(),
                        record.target(),
                        message
                    ))
                })
                .chain(sink),
            true,
        ),
        Err(error) => {
            eprintln!("Failed to open log file '{}': {}", file_path.display(), error);
            (Dispatch::new().level(LevelFilter::Off), false)
        }
    };

    if let Err(error) = Dispatch::new().chain(console).chain(file).apply() {
        eprintln!("Failed to apply logger configuration: {}", error);
        return;
    }

    if file_open {
        log::info!("Console logging at {}, debug log in '{}'.", console_level, file_path.display());
    } else {
        log::warn!("Console logging at {}; file sink unavailable.", console_level);
    }
}
