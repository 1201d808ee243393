//! The network-status signal seam: a synchronous predicate plus online/
//! offline edges, delivered by a host-framework collaborator outside the
//! core's scope.

/// Reports whether the host believes it currently has network connectivity.
/// Implementations are also expected to deliver edges (online/offline
/// transitions) to whichever mechanism the Coordinator subscribes through
/// (e.g. a `tokio::sync::watch` channel) — that delivery mechanism is not
/// part of this trait since it is transport-specific.
pub trait NetworkStatus: Send + Sync {
    /// Returns the current online/offline state.
    fn is_online(&self) -> bool;
}

/// A `NetworkStatus` that is always online, for tests and for embedders
/// with no network-status collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// A `NetworkStatus` backed by a `tokio::sync::watch` channel, for host
/// frameworks that deliver online/offline edges through a broadcast
/// channel rather than a synchronous poll. The sender half is held by
/// whatever collaborator observes the underlying connectivity (a browser
/// `online`/`offline` listener, an OS-level reachability callback, ...)
/// and is not part of this crate's scope.
pub struct WatchNetworkStatus {
    receiver: tokio::sync::watch::Receiver<bool>,
}

impl WatchNetworkStatus {
    /// Wraps an existing watch channel. `initial_online` is read once by
    /// the caller that builds the channel's sender half; this constructor
    /// only ever reads whatever value is currently held.
    pub fn new(receiver: tokio::sync::watch::Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Builds a fresh channel seeded with `initial_online`, returning both
    /// the sender (for the host's connectivity collaborator to drive) and
    /// the `NetworkStatus` reader.
    pub fn channel(initial_online: bool) -> (tokio::sync::watch::Sender<bool>, Self) {
        let (sender, receiver) = tokio::sync::watch::channel(initial_online);
        (sender, Self::new(receiver))
    }
}

impl NetworkStatus for WatchNetworkStatus {
    fn is_online(&self) -> bool {
        *self.receiver.borrow()
    }
}
