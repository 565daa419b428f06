use clap::Parser;

use squash_booking::domain::clock::clock::WallClock;
use squash_booking::domain::datetime::date_time_calculator::DateTimeCalculator;
use squash_booking::domain::selection::time_slot_generator::TimeSlotGenerator;
use squash_booking::{load_config, logger};

use std::sync::Arc;

/// Plans a court booking run: resolves the configuration, computes the
/// target date and the prioritized fallback times. Executing a run needs a
/// headless-browser binding, which the embedding application provides via
/// `squash_booking::run_booking`.
#[derive(Parser, Debug)]
#[command(name = "squash_booking", version, about)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Force a dry run regardless of the configuration
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    logger::init();

    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    if args.dry_run {
        config.dry_run = true;
    }

    let clock = Arc::new(WallClock::new());
    let calculator = Arc::new(DateTimeCalculator::new(config.timezone, clock.clone()));

    let target_date = calculator.booking_date(config.days_ahead);
    log::info!("Target date: {} ({} day(s) ahead, business day: {}).", target_date, config.days_ahead, calculator.is_business_day(target_date));

    let generator = TimeSlotGenerator::new(calculator, clock);
    let slots = generator.generate(&config.target_start_time, &config.time_preferences, config.fallback_time_range, 30, config.fallback_strategy)?;

    log::info!("Prioritized start times around {}:", config.target_start_time);
    for slot in slots.iter().take(8) {
        log::info!("  {} (priority {}, {:+} min)", slot.start_time, slot.priority, slot.distance_minutes);
    }

    log::info!("Mode: {}. Preferred courts: {:?}.", if config.dry_run { "dry run" } else { "LIVE" }, config.preferred_courts);

    Ok(())
}
