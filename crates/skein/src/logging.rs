// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Tracing subscriber bootstrap for applications embedding skein.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is the application's call.

use tracing_subscriber::EnvFilter;

/// Filter used when the requested level does not parse.
pub const FALLBACK_LEVEL: &str = "warn";

/// Builds the filter for `level`, falling back to `warn`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}

/// Installs a global `fmt` subscriber filtered at `level`.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_tracing(level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_level() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(env_filter("debug").max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(env_filter(FALLBACK_LEVEL).max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_tracing("warn");
        assert!(!init_tracing("debug"));
    }
}
