//! Logging helpers
//!
//! The library only talks to the `log` facade; the binary installs
//! `env_logger` once at startup.

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when it is set.
///
/// # Parameters
///
/// * `level` - Log level used when `RUST_LOG` is absent
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding) is harmless.
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Log level selected by the optional debug flag of the command line
pub fn level_for_debug(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}
