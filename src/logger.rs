//! Logging setup: `log` + `log4rs`, with `--verbosity` (1-8) mapped onto a
//! `log::LevelFilter`.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Map the CLI's 1-8 `--verbosity` scale onto a `log::LevelFilter`.
/// 1-2 is errors only, up through 8 which is full trace output.
#[must_use]
pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0..=2 => LevelFilter::Error,
        3..=4 => LevelFilter::Warn,
        5 => LevelFilter::Info,
        6 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initialize logging to stderr at the level implied by `verbosity`,
/// unless `log_config` names a log4rs config file, in which case that file
/// takes precedence.
///
/// # Errors
/// Returns an error if `log_config` is set but the file cannot be loaded,
/// or if building the default config fails.
pub fn init(verbosity: u8, log_config: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = log_config {
        log4rs::init_file(path, log4rs::config::Deserializers::default())?;
        return Ok(());
    }

    let level = level_for_verbosity(verbosity);
    let encoder = Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}"));
    let stderr = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(encoder)
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_monotonically() {
        assert_eq!(level_for_verbosity(1), LevelFilter::Error);
        assert_eq!(level_for_verbosity(5), LevelFilter::Info);
        assert_eq!(level_for_verbosity(8), LevelFilter::Trace);
        assert!(level_for_verbosity(8) >= level_for_verbosity(1));
    }
}
