// src/domain/backend.rs

//! Channel backend domain abstractions.
//!
//! This module defines the contract every channel backend implements. It
//! intentionally avoids any reference to concrete stores, connection
//! libraries, or wire encodings.
//!
//! The channel layer is responsible only for moving opaque messages
//! between named FIFO queues and fanning them out to expiring groups.
//! Higher-level semantics such as retries or cancellation are handled
//! elsewhere.
//!
//! Concrete implementations of this interface live under `src/backend/`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{log_warn, Error, Result};

/// Sleep between empty polls in the default blocking-receive loop.
const BLOCKING_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Grace window applied before expired state is physically evicted.
///
/// Expired entries are invisible to readers immediately; eviction lags
/// behind by this many seconds so that in-flight references to a row or
/// key still resolve while a concurrent sweep runs.
pub(crate) const EXPIRY_GRACE_SECS: i64 = 10;

/// An opaque message body: a mapping from string keys to JSON values.
///
/// The channel layer never inspects message contents; it is purely a
/// transport. Backends that persist messages serialize this map as JSON.
pub type Message = serde_json::Map<String, serde_json::Value>;

/// Milliseconds since the Unix epoch. All expiry bookkeeping uses this.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Reject an empty channel set before hitting the store.
pub(crate) fn ensure_channels(channels: &[String]) -> Result<()> {
    if channels.is_empty() {
        return Err(Error::InvalidArgument(
            "receive_many requires at least one channel".to_string(),
        ));
    }
    Ok(())
}

/// Channel backend abstraction.
///
/// A `ChannelBackend` provides named, implicitly-created FIFO queues
/// ("channels") and named broadcast groups whose memberships age out.
/// Channels are created by the first `send` to an unseen name and are
/// never explicitly destroyed; backends may garbage-collect expired
/// state but must not reject sends to new names.
///
/// Implementations must ensure that:
/// - Messages sent to one channel are delivered in send order as long as
///   delivery is single-consumer per channel.
/// - A message whose expiry has passed is never delivered; it is treated
///   as never having existed (silently skipped, not an error).
/// - `receive_many` returns promptly even when all channels are empty,
///   so a caller can refresh its channel set.
///
/// The in-process backend serves as the reference implementation of
/// these semantics.
#[async_trait::async_trait]
pub trait ChannelBackend: Send + Sync {
    /// Store `message` on `channel` with an expiry of now + configured TTL.
    ///
    /// Creates the channel implicitly if this is its first message.
    async fn send(&self, channel: &str, message: Message) -> Result<()>;

    /// Return the single oldest available, non-expired message across the
    /// given channels, removing it from the backend, or `None` if nothing
    /// is currently available.
    ///
    /// Non-blocking or short-timeout (bounded latency on the order of one
    /// second). An empty channel slice is an invalid-argument error.
    async fn receive_many(&self, channels: &[String]) -> Result<Option<(String, Message)>>;

    /// Wait until a message is available on any of the given channels.
    ///
    /// The default implementation polls `receive_many`, sleeping briefly
    /// between empty results. Backends with a native blocking primitive
    /// may override this for efficiency.
    async fn receive_many_blocking(&self, channels: &[String]) -> Result<(String, Message)> {
        loop {
            if let Some(found) = self.receive_many(channels).await? {
                return Ok(found);
            }
            tokio::time::sleep(BLOCKING_RETRY_INTERVAL).await;
        }
    }

    /// Register `channel` as a member of `group` for at least `expiry_secs`
    /// (default: the backend's configured TTL) seconds from now.
    ///
    /// Re-adding an existing member extends its expiry; idempotent, never
    /// errors on duplicates. Memberships are not renewed automatically.
    async fn group_add(&self, group: &str, channel: &str, expiry_secs: Option<i64>)
        -> Result<()>;

    /// Remove `channel` from `group` if present; no-op when absent.
    async fn group_discard(&self, group: &str, channel: &str) -> Result<()>;

    /// Return the current non-expired members of `group`, lazily evicting
    /// stale memberships as a side effect.
    async fn group_channels(&self, group: &str) -> Result<BTreeSet<String>>;

    /// Send `message` independently to every channel currently in `group`.
    ///
    /// Best-effort fan-out: failure to reach one member is logged and must
    /// not prevent delivery to the others. Backends may override with a
    /// bulk-send optimization.
    async fn send_group(&self, group: &str, message: &Message) -> Result<()> {
        for channel in self.group_channels(group).await? {
            if let Err(_err) = self.send(&channel, message.clone()).await {
                log_warn!("send_group: delivery to channel {channel} failed: {_err}");
            }
        }
        Ok(())
    }

    /// Drop all channel, group, and lock state owned by this backend.
    async fn flush(&self) -> Result<()>;

    /// `true` when the backend is usable only within a single runtime
    /// instance (the in-process backend). Such a backend must not be
    /// shared across independent OS processes.
    fn local_only(&self) -> bool {
        false
    }

    /// Backend-specific locking capability, if any.
    ///
    /// Locking is intentionally not part of the common contract; callers
    /// that need single-owner access to a channel must check for the
    /// capability explicitly.
    fn locking(&self) -> Option<&dyn ChannelLocking> {
        None
    }
}

/// Opt-in mutual-exclusion capability offered by some backends.
///
/// Locks are ephemeral, non-reentrant, best-effort markers. They are not
/// tied to message or group lifecycles and are not consulted by `send` or
/// `receive_many`; callers coordinate through them explicitly.
#[async_trait::async_trait]
pub trait ChannelLocking: Send + Sync {
    /// Attempt an atomic set-if-absent on the lock for `channel`, held
    /// for `expiry_secs` (default: the backend's configured TTL) seconds.
    ///
    /// Returns `Ok(false)` — not an error — when the lock is already held.
    async fn lock_channel(&self, channel: &str, expiry_secs: Option<i64>) -> Result<bool>;

    /// Unconditionally release the lock for `channel`.
    async fn unlock_channel(&self, channel: &str) -> Result<()>;
}

/// Shared backend pointer.
///
/// This is an `Arc<dyn ChannelBackend>`, which means:
/// - `.clone()` is cheap (only increments a reference count)
/// - Multiple clones share the same underlying queues and connections
/// - Used to erase concrete backend types behind a stable domain interface.
pub type BackendPtr = Arc<dyn ChannelBackend>;
