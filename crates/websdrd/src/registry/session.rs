//! Server-side state of one client connection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Notify;
use websdr_core::SessionId;

use crate::receiver::Receiver;

// ============================================================================
// Writable Signal
// ============================================================================

/// Wakes a connection task when its session has something to send.
///
/// Requests coalesce: any number of `request()` calls made before the
/// connection waits yield a single wakeup, which then sends one update
/// carrying everything that changed.
#[derive(Debug, Clone, Default)]
pub struct WritableSignal {
    notify: Arc<Notify>,
}

impl WritableSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a writable turn.
    pub fn request(&self) {
        self.notify.notify_one();
    }

    /// Waits for the next writable turn.
    pub async fn requested(&self) {
        self.notify.notified().await;
    }

    /// Consumes a pending request without waiting.
    ///
    /// Returns true if a request was pending.
    pub fn take_pending(&self) -> bool {
        self.notify.notified().now_or_never().is_some()
    }
}

// ============================================================================
// Dirty Flags
// ============================================================================

/// Which pieces of session state changed since they were last sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub privileged: bool,
    pub demod: bool,
    pub offset: bool,
    pub source: bool,
}

impl DirtyFlags {
    /// Every flag set.
    pub fn all() -> Self {
        Self {
            privileged: true,
            demod: true,
            offset: true,
            source: true,
        }
    }

    /// Returns true if any flag is set.
    pub fn any(&self) -> bool {
        self.privileged || self.demod || self.offset || self.source
    }

    /// Clears the flags set in `sent`, leaving others untouched.
    pub fn clear(&mut self, sent: DirtyFlags) {
        self.privileged &= !sent.privileged;
        self.demod &= !sent.demod;
        self.offset &= !sent.offset;
        self.source &= !sent.source;
    }
}

// ============================================================================
// Session
// ============================================================================

/// One live connection and the receiver it drives.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub receiver: Receiver,
    /// Whether the init bundle has been sent.
    pub initialized: bool,
    pub dirty: DirtyFlags,
    pub writable: WritableSignal,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    /// Creates an uninitialized session.
    ///
    /// Every dirty flag starts set, so the first update delivers the full
    /// receiver state together with the init bundle.
    pub fn new(id: SessionId, receiver: Receiver, writable: WritableSignal) -> Self {
        Self {
            id,
            receiver,
            initialized: false,
            dirty: DirtyFlags::all(),
            writable,
            connected_at: Utc::now(),
        }
    }

    /// Seconds since the connection was established.
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_clear_only_sent() {
        let mut dirty = DirtyFlags {
            privileged: true,
            demod: true,
            offset: false,
            source: false,
        };
        let sent = dirty;
        // Set while the update was being composed
        dirty.offset = true;
        dirty.clear(sent);
        assert_eq!(
            dirty,
            DirtyFlags {
                offset: true,
                ..DirtyFlags::default()
            }
        );
    }

    #[test]
    fn test_dirty_any() {
        assert!(!DirtyFlags::default().any());
        assert!(DirtyFlags::all().any());
    }

    #[tokio::test]
    async fn test_writable_requests_coalesce() {
        let signal = WritableSignal::new();
        signal.request();
        signal.request();
        signal.request();
        assert!(signal.take_pending());
        assert!(!signal.take_pending());
    }

    #[tokio::test]
    async fn test_writable_wakes_waiter() {
        let signal = WritableSignal::new();
        let waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.requested().await });
        signal.request();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("waiter woke")
            .unwrap();
    }
}
