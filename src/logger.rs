use log::LevelFilter;

/// Initializes `env_logger` from the CLI verbosity flags.
///
/// Verbosity applies to this crate only; dependencies stay at `Warn`.
/// `RUST_LOG` directives, when set, override both.
pub fn init(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    };

    env_logger::Builder::new()
        .filter_level(level.min(LevelFilter::Warn))
        .filter_module("receipt_guard", level)
        .filter_module("rguard", level)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    log::debug!("Logger initialized with level: {:?}", level);
}
