// src/backend/redis/backend.rs

//! Remote-store backend implementation against a shared Redis instance.
//!
//! All backend state is namespaced under a configurable key prefix:
//!
//! - `<prefix><channel>`       → LIST of content keys
//! - `<prefix><uuid>`          → serialized message, TTL'd
//! - `<prefix>group:<name>`    → ZSET of channel → expiry-ms score
//! - `<prefix>lock:<channel>`  → presence-only lock marker
//!
//! ## Two connections required
//!
//! `BLPOP` parks the connection it runs on for up to its timeout window,
//! which would stall every other command multiplexed onto it. Two async
//! connections are therefore maintained:
//!
//! - `cmd_conn` — cloned per call, used for all non-blocking commands
//! - `pop_conn` — dedicated to blocking pops, serialized behind a mutex
//!
//! ## Delivery semantics
//!
//! A send writes the message body under a fresh unique key with
//! TTL = configured expiry + grace, then pushes that key onto the
//! channel's list and refreshes the list TTL to the same value. The list
//! expires along with its newest member; a list refreshed by a later
//! send outlives earlier members it keeps around — accepted trade-off.
//!
//! A receive that pops a list entry whose content key has already aged
//! out silently drops the entry and pops again rather than surfacing an
//! error: to the receiver the message never existed.

use redis::aio::MultiplexedConnection;

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    // ---
    domain::{ensure_channels, now_ms, EXPIRY_GRACE_SECS},
    log_debug,
    log_error,
    log_info,
    BackendPtr,
    ChannelBackend,
    ChannelConfig,
    ChannelLocking,
    Error,
    Message,
    Result,
};

/// BLPOP timeout in seconds; the bounded-latency window of `receive_many`.
const RECEIVE_TIMEOUT_SECS: i64 = 1;

fn unavailable(err: redis::RedisError) -> Error {
    Error::Unavailable(format!("redis: {err}"))
}

/// Remote-store implementation of the `ChannelBackend` trait.
///
/// Supports real blocking receive (native `BLPOP`), cross-process groups
/// (sorted sets scored by expiry), and the opt-in `ChannelLocking`
/// capability (`SET NX`).
struct RedisBackend {
    // ---
    expiry_secs: i64,
    prefix: String,
    cmd_conn: MultiplexedConnection,
    pop_conn: Mutex<MultiplexedConnection>,
}

impl RedisBackend {
    fn list_key(&self, channel: &str) -> String {
        format!("{}{}", self.prefix, channel)
    }

    fn group_key(&self, group: &str) -> String {
        format!("{}group:{}", self.prefix, group)
    }

    fn lock_key(&self, channel: &str) -> String {
        format!("{}lock:{}", self.prefix, channel)
    }
}

#[async_trait::async_trait]
impl ChannelBackend for RedisBackend {
    // ---

    async fn send(&self, channel: &str, message: Message) -> Result<()> {
        // ---
        let content = serde_json::to_string(&message)?;
        let ttl = self.expiry_secs + EXPIRY_GRACE_SECS;
        let content_key = format!("{}{}", self.prefix, Uuid::new_v4());
        let list_key = self.list_key(channel);

        let mut conn = self.cmd_conn.clone();

        // A non-positive logical expiry means the message is dead on
        // arrival: skip the content write so the receive path misses it.
        if self.expiry_secs > 0 {
            redis::cmd("SET")
                .arg(&content_key)
                .arg(&content)
                .arg("EX")
                .arg(ttl)
                .query_async::<()>(&mut conn)
                .await
                .map_err(unavailable)?;
        }

        redis::cmd("RPUSH")
            .arg(&list_key)
            .arg(&content_key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(unavailable)?;

        // Refresh the list TTL to match its newest member. A non-positive
        // TTL deletes the list outright, which is exactly what an
        // already-expired send deserves.
        redis::cmd("EXPIRE")
            .arg(&list_key)
            .arg(ttl)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    async fn receive_many(&self, channels: &[String]) -> Result<Option<(String, Message)>> {
        // ---
        ensure_channels(channels)?;

        let keys: Vec<String> = channels.iter().map(|c| self.list_key(c)).collect();
        let mut pop_conn = self.pop_conn.lock().await;

        loop {
            let popped: Option<(String, String)> = redis::cmd("BLPOP")
                .arg(&keys)
                .arg(RECEIVE_TIMEOUT_SECS)
                .query_async(&mut *pop_conn)
                .await
                .map_err(unavailable)?;

            let Some((list_key, content_key)) = popped else {
                return Ok(None);
            };

            let mut conn = self.cmd_conn.clone();
            let content: Option<String> = redis::cmd("GET")
                .arg(&content_key)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;

            // The popped entry referenced a message that aged out between
            // push and pop; drop it and try again.
            let Some(content) = content else {
                log_debug!("receive_many: content key {content_key} expired before delivery");
                continue;
            };

            let channel = list_key[self.prefix.len()..].to_string();
            let message: Message = serde_json::from_str(&content)?;
            return Ok(Some((channel, message)));
        }
    }

    /// Native blocking receive: loop the BLPOP-backed `receive_many`
    /// without the default inter-poll sleep.
    async fn receive_many_blocking(&self, channels: &[String]) -> Result<(String, Message)> {
        // ---
        loop {
            if let Some(found) = self.receive_many(channels).await? {
                return Ok(found);
            }
        }
    }

    async fn group_add(
        &self,
        group: &str,
        channel: &str,
        expiry_secs: Option<i64>,
    ) -> Result<()> {
        // ---
        let expiry = expiry_secs.unwrap_or(self.expiry_secs);
        let mut conn = self.cmd_conn.clone();

        redis::cmd("ZADD")
            .arg(self.group_key(group))
            .arg(now_ms() + expiry * 1000)
            .arg(channel)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    async fn group_discard(&self, group: &str, channel: &str) -> Result<()> {
        // ---
        let mut conn = self.cmd_conn.clone();

        redis::cmd("ZREM")
            .arg(self.group_key(group))
            .arg(channel)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    async fn group_channels(&self, group: &str) -> Result<BTreeSet<String>> {
        // ---
        let key = self.group_key(group);
        let now = now_ms();
        let mut conn = self.cmd_conn.clone();

        // Lazy eviction, then return only members still scored in the
        // future. Membership enforcement happens exclusively on reads.
        redis::cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(now - EXPIRY_GRACE_SECS * 1000)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(unavailable)?;

        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&key)
            .arg(format!("({now}"))
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(members.into_iter().collect())
    }

    async fn flush(&self) -> Result<()> {
        // ---
        let pattern = format!("{}*", self.prefix);
        let mut conn = self.cmd_conn.clone();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;

            if !keys.is_empty() {
                redis::cmd("DEL")
                    .arg(&keys)
                    .query_async::<i64>(&mut conn)
                    .await
                    .map_err(unavailable)?;
            }

            cursor = next;
            if cursor == 0 {
                return Ok(());
            }
        }
    }

    fn locking(&self) -> Option<&dyn ChannelLocking> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl ChannelLocking for RedisBackend {
    // ---

    async fn lock_channel(&self, channel: &str, expiry_secs: Option<i64>) -> Result<bool> {
        // ---
        let ttl = expiry_secs.unwrap_or(self.expiry_secs).max(1);
        let mut conn = self.cmd_conn.clone();

        // SET NX returns nil when the key already exists.
        let acquired: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(channel))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(acquired.is_some())
    }

    async fn unlock_channel(&self, channel: &str) -> Result<()> {
        // ---
        let mut conn = self.cmd_conn.clone();

        redis::cmd("DEL")
            .arg(self.lock_key(channel))
            .query_async::<i64>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(())
    }
}

/// Create a remote-store backend for the configured Redis URI.
///
/// # Errors
///
/// Returns a configuration error if the URI is missing or unparsable,
/// and an unavailability error if either connection cannot be
/// established (both connections are eager).
pub async fn create_backend(config: &ChannelConfig) -> Result<BackendPtr> {
    // ---

    let Some(uri) = config.uri.as_deref() else {
        return Err(Error::Configuration(
            "redis backend requires a store URI".to_string(),
        ));
    };

    let client = redis::Client::open(uri)
        .map_err(|err| Error::Configuration(format!("redis: invalid URI {uri}: {err}")))?;

    let cmd_conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|err| {
            let msg = format!("redis: failed to connect command connection to {uri}: {err}");
            log_error!("{msg}");
            Error::Unavailable(msg)
        })?;

    let pop_conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|err| {
            let msg = format!("redis: failed to connect pop connection to {uri}: {err}");
            log_error!("{msg}");
            Error::Unavailable(msg)
        })?;

    log_info!("connected to redis store at {uri}");

    Ok(Arc::new(RedisBackend {
        expiry_secs: config.expiry_secs,
        prefix: config.prefix.clone(),
        cmd_conn,
        pop_conn: Mutex::new(pop_conn),
    }))
}
