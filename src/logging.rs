//! Logging setup.
//!
//! `RUST_LOG` wins when set; otherwise `-q` means errors only, `-v` debug and
//! `-vv` trace, with `info` as the default. Logs go to stderr so stdout stays
//! clean for command output.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub fn level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(level(verbose, quiet).into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 0)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, false, LevelFilter::INFO)]
    #[case(1, false, LevelFilter::DEBUG)]
    #[case(2, false, LevelFilter::TRACE)]
    #[case(7, false, LevelFilter::TRACE)]
    #[case(0, true, LevelFilter::ERROR)]
    fn test_level(#[case] verbose: u8, #[case] quiet: bool, #[case] expected: LevelFilter) {
        assert_eq!(level(verbose, quiet), expected);
    }
}
