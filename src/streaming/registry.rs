//! Registered streams awaiting delivery.
//!
//! `POST /api/stream` stores a descriptor here and hands out its id; the
//! client then fetches `/api/stream/:id`. Entries expire after the configured
//! lifespan and are consumed on first use unless streams are reusable.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mediaforge_common::{StreamDescriptor, StreamId};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StreamConfig;

/// A descriptor waiting to be delivered.
#[derive(Debug, Clone)]
pub struct RegisteredStream {
    pub descriptor: StreamDescriptor,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RegisteredStream {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe, expiring map from stream id to descriptor.
#[derive(Clone)]
pub struct StreamRegistry {
    streams: Arc<DashMap<StreamId, RegisteredStream>>,
    lifespan: Duration,
    reusable: bool,
}

impl StreamRegistry {
    pub fn new(lifespan: Duration, reusable: bool) -> Self {
        Self {
            streams: Arc::new(DashMap::new()),
            lifespan,
            reusable,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.lifespan(), config.reusable)
    }

    /// Store a descriptor and return its id.
    pub fn register(&self, descriptor: StreamDescriptor) -> StreamId {
        let id = StreamId::new();
        let now = Utc::now();
        let lifespan =
            chrono::Duration::from_std(self.lifespan).unwrap_or_else(|_| chrono::Duration::seconds(90));

        tracing::info!(
            stream_id = %id,
            service = %descriptor.service,
            kind = %descriptor.kind,
            "Registered stream"
        );

        self.streams.insert(
            id,
            RegisteredStream {
                descriptor,
                created_at: now,
                expires_at: now + lifespan,
            },
        );
        id
    }

    /// Fetch a descriptor for delivery.
    ///
    /// Consumes the entry unless streams are reusable. Expired entries are
    /// removed and reported as missing.
    pub fn take(&self, id: &StreamId) -> Option<StreamDescriptor> {
        let now = Utc::now();

        if self.reusable {
            let expired = match self.streams.get(id) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.descriptor.clone()),
                Some(_) => true,
                None => false,
            };
            if expired {
                self.streams.remove(id);
            }
            return None;
        }

        let (_, stream) = self.streams.remove(id)?;
        (!stream.is_expired(now)).then_some(stream.descriptor)
    }

    /// Remove expired entries.
    ///
    /// # Returns
    /// The number of entries that were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();

        let mut removed_count = 0;
        self.streams.retain(|stream_id, stream| {
            if stream.is_expired(now) {
                tracing::debug!(
                    stream_id = %stream_id,
                    age_secs = (now - stream.created_at).num_seconds(),
                    "Expired stream removed"
                );
                removed_count += 1;
                false
            } else {
                true
            }
        });

        if removed_count > 0 {
            tracing::debug!(removed = removed_count, "Cleaned up expired streams");
        }

        removed_count
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

/// Start a background task that periodically removes expired streams.
pub fn start_cleanup_task(
    registry: StreamRegistry,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            registry.cleanup_expired();
        }
    })
}
