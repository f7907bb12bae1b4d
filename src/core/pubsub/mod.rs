// src/core/pubsub/mod.rs

//! The publish-subscribe broker.
//!
//! All subscription state lives in three maps guarded by a single mutex:
//! channel -> subscribers, pattern -> subscribers, and a reverse index from a
//! connection to everything it subscribed to. One lock for all three keeps
//! `publish` and `unsubscribe_all` free of lock-ordering hazards, and the
//! reverse index makes closing a connection proportional to its own
//! subscriptions rather than to the size of the tables.

use crate::connection::{ConnectionHandle, ConnectionId, PushOutcome, ReplySlot};
use crate::core::metrics;
use crate::core::protocol::{RespFrame, RespValue};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

pub mod glob;

pub use glob::glob_match;

type Subscribers = HashMap<ConnectionId, ConnectionHandle>;

/// Everything one connection is subscribed to.
#[derive(Debug, Default)]
struct ConnectionSubscriptions {
    channels: HashSet<Bytes>,
    patterns: HashSet<Bytes>,
}

impl ConnectionSubscriptions {
    fn count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }
}

#[derive(Debug, Default)]
struct SubscriptionTables {
    channels: HashMap<Bytes, Subscribers>,
    // Ordered so the pattern reported in a `pmessage` is deterministic.
    patterns: BTreeMap<Bytes, Subscribers>,
    by_connection: HashMap<ConnectionId, ConnectionSubscriptions>,
}

impl SubscriptionTables {
    fn count_for(&self, id: ConnectionId) -> usize {
        self.by_connection.get(&id).map_or(0, |s| s.count())
    }

    fn forget_if_empty(&mut self, id: ConnectionId) {
        if self.by_connection.get(&id).is_some_and(|s| s.count() == 0) {
            self.by_connection.remove(&id);
        }
    }
}

/// The central hub for channel and pattern subscriptions.
#[derive(Debug, Default)]
pub struct Broker {
    tables: Mutex<SubscriptionTables>,
}

impl Broker {
    pub fn new() -> Self {
        Default::default()
    }

    /// Subscribes a connection to an exact channel name. Idempotent.
    ///
    /// The `["subscribe", channel, count]` confirmation goes into `ack`, room the
    /// caller reserved in the connection's own queue. It is filled before the
    /// lock is released, so it always precedes the first message delivered for
    /// this subscription. Returns the connection's total number of
    /// subscriptions afterwards.
    pub fn subscribe(
        &self,
        conn: &ConnectionHandle,
        channel: Bytes,
        ack: ReplySlot<'_>,
    ) -> usize {
        let mut tables = self.tables.lock();
        let id = conn.id();
        tables
            .channels
            .entry(channel.clone())
            .or_default()
            .insert(id, conn.clone());
        tables
            .by_connection
            .entry(id)
            .or_default()
            .channels
            .insert(channel.clone());
        let count = tables.count_for(id);
        ack.fill(RespValue::subscription_ack("subscribe", Some(channel), count).into());
        count
    }

    /// Subscribes a connection to a glob pattern. Idempotent.
    ///
    /// Confirms with `["psubscribe", pattern, count]` the same way
    /// [`Broker::subscribe`] does.
    pub fn psubscribe(
        &self,
        conn: &ConnectionHandle,
        pattern: Bytes,
        ack: ReplySlot<'_>,
    ) -> usize {
        let mut tables = self.tables.lock();
        let id = conn.id();
        tables
            .patterns
            .entry(pattern.clone())
            .or_default()
            .insert(id, conn.clone());
        tables
            .by_connection
            .entry(id)
            .or_default()
            .patterns
            .insert(pattern.clone());
        let count = tables.count_for(id);
        ack.fill(RespValue::subscription_ack("psubscribe", Some(pattern), count).into());
        count
    }

    /// Removes one channel subscription.
    ///
    /// Returns the remaining subscription count, or `None` if the connection was
    /// not subscribed to `channel`.
    pub fn unsubscribe(&self, id: ConnectionId, channel: &Bytes) -> Option<usize> {
        let mut tables = self.tables.lock();
        let removed = tables
            .by_connection
            .get_mut(&id)
            .is_some_and(|subs| subs.channels.remove(channel));
        if !removed {
            return None;
        }
        if let Some(subscribers) = tables.channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                tables.channels.remove(channel);
            }
        }
        let remaining = tables.count_for(id);
        tables.forget_if_empty(id);
        Some(remaining)
    }

    /// Removes one pattern subscription. See [`Broker::unsubscribe`].
    pub fn punsubscribe(&self, id: ConnectionId, pattern: &Bytes) -> Option<usize> {
        let mut tables = self.tables.lock();
        let removed = tables
            .by_connection
            .get_mut(&id)
            .is_some_and(|subs| subs.patterns.remove(pattern));
        if !removed {
            return None;
        }
        if let Some(subscribers) = tables.patterns.get_mut(pattern) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                tables.patterns.remove(pattern);
            }
        }
        let remaining = tables.count_for(id);
        tables.forget_if_empty(id);
        Some(remaining)
    }

    /// Returns the channels a connection is subscribed to, sorted.
    pub fn channels_of(&self, id: ConnectionId) -> Vec<Bytes> {
        let tables = self.tables.lock();
        let mut channels: Vec<Bytes> = tables
            .by_connection
            .get(&id)
            .map(|s| s.channels.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    /// Returns the patterns a connection is subscribed to, sorted.
    pub fn patterns_of(&self, id: ConnectionId) -> Vec<Bytes> {
        let tables = self.tables.lock();
        let mut patterns: Vec<Bytes> = tables
            .by_connection
            .get(&id)
            .map(|s| s.patterns.iter().cloned().collect())
            .unwrap_or_default();
        patterns.sort();
        patterns
    }

    /// Drops every subscription held by a connection.
    ///
    /// Safe to call for a connection that never subscribed. Returns how many
    /// subscriptions were removed.
    pub fn unsubscribe_all(&self, id: ConnectionId) -> usize {
        let mut tables = self.tables.lock();
        let Some(subs) = tables.by_connection.remove(&id) else {
            return 0;
        };
        let removed = subs.count();

        for channel in &subs.channels {
            if let Some(subscribers) = tables.channels.get_mut(channel) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    tables.channels.remove(channel);
                }
            }
        }
        for pattern in &subs.patterns {
            if let Some(subscribers) = tables.patterns.get_mut(pattern) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    tables.patterns.remove(pattern);
                }
            }
        }

        debug!("Removed {} subscriptions for connection {}.", removed, id);
        removed
    }

    /// Publishes a message to a channel.
    ///
    /// The recipients are the direct subscribers of `channel` plus every
    /// connection holding a pattern that matches it, each counted once. A
    /// connection subscribed directly receives a `message` push; one that only
    /// matches through patterns receives a single `pmessage` for the first
    /// matching pattern in byte order.
    ///
    /// Returns the number of connections the message was queued for.
    pub fn publish(&self, channel: &Bytes, message: Bytes) -> usize {
        let tables = self.tables.lock();
        let mut recipients: HashMap<ConnectionId, (&ConnectionHandle, Option<&Bytes>)> =
            HashMap::new();

        if let Some(subscribers) = tables.channels.get(channel) {
            for (id, handle) in subscribers {
                recipients.insert(*id, (handle, None));
            }
        }

        for (pattern, subscribers) in &tables.patterns {
            if !glob_match(pattern, channel) {
                continue;
            }
            for (id, handle) in subscribers {
                recipients.entry(*id).or_insert((handle, Some(pattern)));
            }
        }

        // Delivery happens under the lock. `push` never waits, and holding the
        // lock is what orders concurrent publishes consistently per connection.
        let mut delivered = 0;
        for (id, (handle, pattern)) in recipients {
            let frame = match pattern {
                None => message_frame(channel, &message),
                Some(pattern) => pmessage_frame(pattern, channel, &message),
            };
            match handle.push(frame) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::Overflow => {
                    metrics::SLOW_SUBSCRIBERS_DISCONNECTED_TOTAL.inc();
                    warn!(
                        "Outbound queue of connection {} is full; disconnecting slow subscriber.",
                        id
                    );
                }
                PushOutcome::Closed => {
                    debug!("Skipping publish to closing connection {}.", id);
                }
            }
        }

        metrics::PUBSUB_MESSAGES_DELIVERED_TOTAL.inc_by(delivered as f64);
        delivered
    }

    /// Returns the number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.tables.lock().channels.len()
    }

    /// Returns the number of patterns with at least one subscriber.
    pub fn pattern_count(&self) -> usize {
        self.tables.lock().patterns.len()
    }

    /// Returns the number of connections holding any subscription.
    pub fn subscribed_connection_count(&self) -> usize {
        self.tables.lock().by_connection.len()
    }

    /// Returns the number of direct subscribers of a channel.
    pub fn numsub(&self, channel: &Bytes) -> usize {
        self.tables
            .lock()
            .channels
            .get(channel)
            .map_or(0, |s| s.len())
    }

    /// Returns how many subscriptions a connection holds.
    pub fn subscription_count(&self, id: ConnectionId) -> usize {
        self.tables.lock().count_for(id)
    }
}

fn message_frame(channel: &Bytes, message: &Bytes) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString(Bytes::from_static(b"message")),
        RespFrame::BulkString(channel.clone()),
        RespFrame::BulkString(message.clone()),
    ])
}

fn pmessage_frame(pattern: &Bytes, channel: &Bytes, message: &Bytes) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString(Bytes::from_static(b"pmessage")),
        RespFrame::BulkString(pattern.clone()),
        RespFrame::BulkString(channel.clone()),
        RespFrame::BulkString(message.clone()),
    ])
}
