// src/backend/memory/backend.rs

//! In-process backend implementation.
//!
//! This file contains the concrete implementation of the domain-level
//! `ChannelBackend` trait using in-process data structures only.
//!
//! The memory backend is the **reference implementation** of channel
//! semantics. Other backends are expected to approximate this behavior
//! as closely as their underlying stores allow and to document any
//! unavoidable deviations.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use std::sync::Arc;

use crate::{
    // ---
    domain::{ensure_channels, now_ms, EXPIRY_GRACE_SECS},
    BackendPtr,
    ChannelBackend,
    ChannelConfig,
    Message,
    Result,
};

struct QueuedMessage {
    expires_at_ms: i64,
    message: Message,
}

/// In-process channel backend.
///
/// Holds one local FIFO queue per channel name, shared by every caller
/// holding a clone of the same `BackendPtr`. State lives for the life of
/// the backend instance; empty-channel bookkeeping is intentionally never
/// removed, which is acceptable for this backend's local/testing role.
///
/// ## Semantics
///
/// - `send` appends to the channel's queue, creating it if absent.
/// - `receive_many` scans the requested names in caller order and pops
///   the head of the first non-empty channel, discarding expired heads.
/// - Groups are an explicit in-memory membership store; fan-out uses the
///   trait's default `send_group`.
///
/// ## Non-Goals
///
/// - Persistence or durability
/// - Use across independent OS processes (`local_only()` is `true`)
struct MemoryBackend {
    // ---
    expiry_secs: i64,
    channels: Mutex<HashMap<String, VecDeque<QueuedMessage>>>,
    groups: Mutex<HashMap<String, HashMap<String, i64>>>,
}

impl MemoryBackend {
    fn lock_channels(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<QueuedMessage>>> {
        // Mutex poisoning only happens if a holder panicked; the queue
        // contents are still structurally sound, so keep going.
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_groups(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, i64>>> {
        self.groups.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl ChannelBackend for MemoryBackend {
    // ---

    async fn send(&self, channel: &str, message: Message) -> Result<()> {
        // ---
        let mut channels = self.lock_channels();

        channels
            .entry(channel.to_string())
            .or_default()
            .push_back(QueuedMessage {
                expires_at_ms: now_ms() + self.expiry_secs * 1000,
                message,
            });

        Ok(())
    }

    /// Scan the requested channels in caller-supplied order and pop the
    /// first live message found. Expired heads are discarded in passing;
    /// the empty queue itself is kept.
    async fn receive_many(&self, channels: &[String]) -> Result<Option<(String, Message)>> {
        // ---
        ensure_channels(channels)?;

        let now = now_ms();
        let mut map = self.lock_channels();

        for name in channels {
            let Some(queue) = map.get_mut(name) else {
                continue;
            };

            while let Some(head) = queue.pop_front() {
                if head.expires_at_ms <= now {
                    continue;
                }
                return Ok(Some((name.clone(), head.message)));
            }
        }

        Ok(None)
    }

    async fn group_add(
        &self,
        group: &str,
        channel: &str,
        expiry_secs: Option<i64>,
    ) -> Result<()> {
        // ---
        let expiry = expiry_secs.unwrap_or(self.expiry_secs);
        let mut groups = self.lock_groups();

        groups
            .entry(group.to_string())
            .or_default()
            .insert(channel.to_string(), now_ms() + expiry * 1000);

        Ok(())
    }

    async fn group_discard(&self, group: &str, channel: &str) -> Result<()> {
        // ---
        let mut groups = self.lock_groups();

        if let Some(members) = groups.get_mut(group) {
            members.remove(channel);
        }

        Ok(())
    }

    async fn group_channels(&self, group: &str) -> Result<BTreeSet<String>> {
        // ---
        let now = now_ms();
        let mut groups = self.lock_groups();

        let Some(members) = groups.get_mut(group) else {
            return Ok(BTreeSet::new());
        };

        // Lazy eviction: entries expired past the grace window are removed
        // outright; already-expired entries within the window are merely
        // hidden from the result.
        members.retain(|_, expires_at| *expires_at > now - EXPIRY_GRACE_SECS * 1000);

        Ok(members
            .iter()
            .filter(|(_, expires_at)| **expires_at > now)
            .map(|(channel, _)| channel.clone())
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        // ---
        self.lock_channels().clear();
        self.lock_groups().clear();
        Ok(())
    }

    fn local_only(&self) -> bool {
        true
    }
}

/// Create a new in-process backend.
///
/// This backend is always available and requires no external resources.
/// All callers within one runtime instance must share the returned
/// pointer; independent instances do not see each other's queues.
pub async fn create_backend(config: &ChannelConfig) -> Result<BackendPtr> {
    // ---

    let backend = MemoryBackend {
        // ---
        expiry_secs: config.expiry_secs,
        channels: Mutex::new(HashMap::new()),
        groups: Mutex::new(HashMap::new()),
    };

    Ok(Arc::new(backend))
}
