//! CLI and environment-variable configuration.

use clap::Parser;

use crate::supervisor::DEFAULT_WORKERS;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_DB_PATH: &str = "fricu_server.db";

/// Pre-forked, readiness-driven HTTP key-value server backed by an embedded
/// SQLite store.
#[derive(Debug, Parser)]
#[command(name = "fricu-server", version, about)]
pub struct Config {
    /// Address the listening socket binds to.
    ///
    /// Kept as a raw string rather than `SocketAddr` so a malformed value is
    /// reported through the same logged-error, exit-1 path as every other
    /// startup failure instead of clap's own usage-error exit.
    #[arg(long, env = "FRICU_SERVER_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Path to the SQLite database file; created on first run.
    #[arg(long, env = "FRICU_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: std::path::PathBuf,

    /// Number of worker threads; clamped to [1, 1024].
    #[arg(long, env = "FRICU_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn defaults_match_the_original_service() {
        let cfg = Config::parse_from(["fricu-server"]);
        assert_eq!(cfg.bind, DEFAULT_BIND);
        assert_eq!(cfg.db_path.to_str().unwrap(), DEFAULT_DB_PATH);
        assert_eq!(cfg.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = Config::parse_from([
            "fricu-server",
            "--bind",
            "127.0.0.1:9090",
            "--db-path",
            "/tmp/x.db",
            "--workers",
            "8",
        ]);
        assert_eq!(cfg.bind, "127.0.0.1:9090");
        assert_eq!(cfg.db_path.to_str().unwrap(), "/tmp/x.db");
        assert_eq!(cfg.workers, 8);
    }

    #[test]
    fn an_invalid_bind_string_is_accepted_by_clap_and_left_for_main_to_reject() {
        let cfg = Config::parse_from(["fricu-server", "--bind", "not-an-address"]);
        assert!(cfg.bind.parse::<SocketAddr>().is_err());
    }
}
