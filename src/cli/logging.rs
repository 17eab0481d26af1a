//! Host log setup
//!
//! Filter comes from `MOONHOST_LOG` (e.g. `moonhost=debug`), default `info`.
//! Logs go to stderr so stdout stays one JSON response per line.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "MOONHOST_LOG";

pub fn init(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second init (tests, embedding) keeps the first subscriber
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
