use clap::Parser;
use tracing_subscriber::EnvFilter;

use fricu_server::{config::Config, net, store, supervisor};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::parse();

    let bind_addr: std::net::SocketAddr = config.bind.parse().map_err(|err| {
        tracing::error!(%err, bind = %config.bind, "invalid bind address");
        anyhow::anyhow!("invalid bind address {:?}: {err}", config.bind)
    })?;

    tracing::info!(
        bind = %bind_addr,
        db_path = %config.db_path.display(),
        workers = config.workers,
        "starting fricu-server"
    );

    let max_fd = match net::tune_fd_limit() {
        Ok(limit) => limit as usize,
        Err(err) => {
            tracing::warn!(%err, "failed to raise file descriptor limit, continuing with current limit");
            // SAFETY: getrlimit with a valid buffer always succeeds if
            // setrlimit above didn't already return the current limit.
            let mut lim = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
            unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) };
            lim.rlim_cur as usize
        }
    };

    store::bootstrap(&config.db_path).map_err(|err| {
        tracing::error!(%err, db_path = %config.db_path.display(), "failed to bootstrap store");
        anyhow::anyhow!("failed to bootstrap store at {:?}: {err}", config.db_path)
    })?;

    let listener = net::bind_listener(bind_addr).map_err(|err| {
        tracing::error!(%err, bind = %bind_addr, "failed to bind listening socket");
        anyhow::anyhow!("failed to bind {bind_addr}: {err}")
    })?;

    supervisor::run(listener, config.db_path, max_fd, config.workers);

    Ok(())
}
