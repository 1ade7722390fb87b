//! Logging and tracing initialization.
//!
//! The engine never reads the environment; the filter comes from
//! [`LoggingConfig::level`] alone.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Filter directives for `config`, falling back to `info` when the level
/// string does not parse.
pub fn log_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber.
///
/// Returns `false` when a subscriber was already installed, which is normal
/// for hosts that set up tracing themselves.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = log_filter(config);

    if let Some(path) = &config.file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let subscriber = fmt::Subscriber::builder()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
                    .finish();
                return tracing::subscriber::set_global_default(subscriber).is_ok();
            }
            Err(e) => {
                eprintln!("loopforge: cannot open log file {}: {e}", path.display());
            }
        }
    }

    let installed = if config.json {
        let subscriber = fmt::Subscriber::builder().with_env_filter(filter).json().finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };
    installed.is_ok()
}

/// Initialize logging with defaults (useful for tests and quick scripts).
pub fn init_default_logging() -> bool {
    init_logging(&LoggingConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_falls_back_to_info() {
        use tracing_subscriber::filter::LevelFilter;

        let config = LoggingConfig {
            level: "loopforge_render_engine=debug,warn".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(log_filter(&config).max_level_hint(), Some(LevelFilter::DEBUG));

        let bad = LoggingConfig {
            level: "loopforge=loud".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(log_filter(&bad).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_second_init_is_rejected() {
        init_default_logging();
        assert!(!init_default_logging());
    }
}
