//! Spawns and joins the worker thread pool.

use std::{path::PathBuf, thread};

use socket2::Socket;

/// Default worker count when `--workers` / `FRICU_WORKERS` is unset.
pub const DEFAULT_WORKERS: usize = 64;
/// Inclusive bounds a configured worker count is clamped into.
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 1024;

/// Clamps a requested worker count into `[MIN_WORKERS, MAX_WORKERS]`.
pub fn clamp_workers(requested: usize) -> usize {
    requested.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Spawns `workers` threads, each running its own [`crate::worker::run`]
/// loop over a clone of `listener`'s underlying descriptor, and blocks until
/// every one exits (which, barring a startup failure, is never — the
/// process is expected to be killed rather than shut down gracefully).
///
/// A descriptor-clone or thread-spawn failure is logged at `error` and exits
/// the process with status 1, same as the other startup-failure modes in
/// `main` — this runs on `panic = "abort"` builds, so panicking here would
/// abort with no log line and no controlled exit code instead.
pub fn run(listener: Socket, db_path: PathBuf, max_fd: usize, workers: usize) {
    let workers = clamp_workers(workers);
    tracing::info!(workers, max_fd, "starting worker pool");

    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let listener = match listener.try_clone() {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(%err, id, "failed to clone listening socket for worker");
                std::process::exit(1);
            }
        };
        let db_path = db_path.clone();
        let handle = thread::Builder::new()
            .name(format!("fricu-worker-{id}"))
            .spawn(move || crate::worker::run(&listener, &db_path, max_fd));
        match handle {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                tracing::error!(%err, id, "failed to spawn worker thread");
                std::process::exit(1);
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }
}
