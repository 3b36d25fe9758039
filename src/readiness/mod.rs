//! Platform readiness abstraction.
//!
//! A uniform, blocking, level-triggered interface over the kernel readiness
//! facility: epoll on Linux, kqueue on macOS/BSD. Workers never see the raw
//! syscalls; they see [`Readiness::wait`] yielding a batch of ready
//! descriptors with an error/hangup flag.

use std::os::unix::io::RawFd;

use crate::errors::ReadinessError;

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(not(target_os = "linux"))]
mod kqueue;

#[cfg(target_os = "linux")]
pub use epoll::Epoll as Readiness;
#[cfg(not(target_os = "linux"))]
pub use kqueue::Kqueue as Readiness;

/// The maximum number of events a single [`Readiness::wait`] call returns.
pub const MAX_EVENTS: usize = 1024;

/// How a descriptor was registered, which governs how its readiness events
/// are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The shared listening socket: readiness means "at least one connection
    /// is acceptable", never an error condition.
    Listener,
    /// A client connection: readiness means "data may be available to read",
    /// and hangup/error flags are meaningful.
    Client,
}

/// One ready descriptor returned from [`Readiness::wait`].
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub fd: RawFd,
    /// Set when the kernel also reported an error or peer-hangup condition.
    /// Always `false` for the listener.
    pub hangup: bool,
}

/// The operations every platform backend must provide. Implemented once per
/// platform in `epoll` / `kqueue`; never used as a trait object — the
/// concrete type is selected at compile time and re-exported as `Readiness`.
pub trait ReadinessQueue: Sized {
    fn create() -> Result<Self, ReadinessError>;
    fn register(&self, fd: RawFd, role: Role) -> Result<(), ReadinessError>;
    fn unregister(&self, fd: RawFd) -> Result<(), ReadinessError>;
    /// Blocks until at least one descriptor is ready, retrying internally on
    /// `EINTR`. Returns the ready events, truncated to `events.len()`.
    fn wait(&self, events: &mut [ReadyEvent]) -> Result<usize, ReadinessError>;
}
