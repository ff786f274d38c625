use std::sync::Once;

use env_logger::Env;
use log::LevelFilter;

const LOG_ENV: &str = "JOYSTICK_LOG";
const FALLBACK_LOG_ENV: &str = "RUST_LOG";

static LOG_ONCE: Once = Once::new();

/// Variable holding the filter: `JOYSTICK_LOG` when set, else `RUST_LOG`.
fn filter_env_var() -> &'static str {
    if std::env::var_os(LOG_ENV).is_some() {
        LOG_ENV
    } else {
        FALLBACK_LOG_ENV
    }
}

fn level_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

fn parse_level(input: Option<&str>) -> Option<LevelFilter> {
    input.and_then(|s| s.parse::<LevelFilter>().ok())
}

/// Initialize stderr logging based on `JOYSTICK_LOG`/`RUST_LOG`.
pub fn init_logging() {
    init_logging_with(None);
}

/// Initialize stderr logging with an explicit level, falling back to the
/// environment when `level` is absent or unparsable.
/// Safe to call multiple times; only the first call installs the logger.
pub fn init_logging_with(level: Option<&str>) {
    let explicit = parse_level(level);
    LOG_ONCE.call_once(|| {
        let mut builder = match explicit {
            Some(level) => {
                let mut builder = env_logger::Builder::new();
                builder.filter_level(level);
                builder
            }
            None => {
                let env = Env::new()
                    .filter_or(filter_env_var(), level_to_str(LevelFilter::Info))
                    .write_style("RUST_LOG_STYLE");
                env_logger::Builder::from_env(env)
            }
        };
        builder
            .format_timestamp_millis()
            .format_module_path(true)
            .format_target(true)
            .init();
    });
}
