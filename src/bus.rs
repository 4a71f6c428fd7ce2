// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! In-process publish-subscribe for domain events.
//!
//! Channels are addressed by string name: `messages`, `detections`, `media`,
//! `backfill`, plus per-dialog specializations such as `messages:10042`.
//! `messages`/`detections`/`media` subscribers are bounded broadcast streams
//! where overflow drops the oldest events; `backfill` subscribers are bounded
//! queues and publishing blocks when a subscriber is full.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::error;

/// Capacity of each subscriber stream.
const CHANNEL_CAPACITY: usize = 1024;

/// Domain events published by the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    NewMessage {
        dialog_id: i32,
        dialog_telegram_id: i64,
        message_id: i64,
        telegram_message_id: i64,
        text: Option<String>,
        has_media: bool,
    },
    NewDetection {
        dialog_id: i32,
        message_id: i64,
        detector_name: String,
        detection_type: String,
        matched_text: String,
        normalized_value: String,
    },
    BackfillProgress {
        dialog_id: i32,
        dialog_telegram_id: i64,
        cursor: i64,
        pages_done: u64,
        messages_saved: u64,
        finished: bool,
    },
    MediaDownloaded {
        media_file_id: i32,
        message_id: i64,
        dialog_id: i32,
        content_hash: String,
        file_path: String,
        deduplicated: bool,
    },
    AccountStatus {
        account_id: i32,
        status: String,
    },
}

impl DomainEvent {
    /// Base channel this event is published on.
    pub fn channel(&self) -> &'static str {
        match self {
            DomainEvent::NewMessage { .. } => "messages",
            DomainEvent::NewDetection { .. } => "detections",
            DomainEvent::BackfillProgress { .. } => "backfill",
            DomainEvent::MediaDownloaded { .. } => "media",
            DomainEvent::AccountStatus { .. } => "accounts",
        }
    }

    /// Dialog this event concerns, when it has one.
    pub fn dialog_id(&self) -> Option<i32> {
        match self {
            DomainEvent::NewMessage { dialog_id, .. }
            | DomainEvent::NewDetection { dialog_id, .. }
            | DomainEvent::BackfillProgress { dialog_id, .. }
            | DomainEvent::MediaDownloaded { dialog_id, .. } => Some(*dialog_id),
            DomainEvent::AccountStatus { .. } => None,
        }
    }

    /// JSON payload sent to stream subscribers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            error!("Failed to serialize domain event: {}", e);
            json!({"event": "serialization_error"})
        })
    }
}

/// A subscription to one bus channel.
pub enum BusStream {
    Broadcast(broadcast::Receiver<DomainEvent>),
    Queue(mpsc::Receiver<DomainEvent>),
}

impl BusStream {
    /// Receive the next event. Returns `None` when the channel is closed.
    /// Broadcast overflow skips the dropped (oldest) events.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        match self {
            BusStream::Broadcast(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            BusStream::Queue(rx) => rx.recv().await,
        }
    }
}

/// In-process event bus.
pub struct EventBus {
    /// Broadcast channels, created on demand, keyed by channel name.
    channels: DashMap<String, broadcast::Sender<DomainEvent>>,
    /// Backfill subscribers; publishing blocks while a queue is full.
    backfill_subscribers: Mutex<Vec<mpsc::Sender<DomainEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            backfill_subscribers: Mutex::new(Vec::new()),
        }
    }

    fn broadcast_sender(&self, channel: &str) -> broadcast::Sender<DomainEvent> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish an event to its base channel and, when it concerns a dialog,
    /// to the per-dialog specialization.
    pub async fn publish(&self, event: DomainEvent) {
        let base = event.channel();

        if base == "backfill" {
            let mut subscribers = self.backfill_subscribers.lock().await;
            let mut dead = Vec::new();
            for (idx, tx) in subscribers.iter().enumerate() {
                if tx.send(event.clone()).await.is_err() {
                    dead.push(idx);
                }
            }
            for idx in dead.into_iter().rev() {
                subscribers.swap_remove(idx);
            }
            return;
        }

        // A send error just means nobody is subscribed on that channel.
        let _ = self.broadcast_sender(base).send(event.clone());
        if let Some(dialog_id) = event.dialog_id() {
            let specialized = format!("{}:{}", base, dialog_id);
            if let Some(tx) = self.channels.get(&specialized) {
                let _ = tx.send(event);
            }
        }
    }

    /// Subscribe to a channel by name.
    pub async fn subscribe(&self, channel: &str) -> BusStream {
        if channel == "backfill" || channel.starts_with("backfill:") {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            self.backfill_subscribers.lock().await.push(tx);
            BusStream::Queue(rx)
        } else {
            BusStream::Broadcast(self.broadcast_sender(channel).subscribe())
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_base_and_specialized_subscribers() {
        let bus = EventBus::new();
        let mut base = bus.subscribe("messages").await;
        let mut specialized = bus.subscribe("messages:7").await;
        let mut other = bus.subscribe("messages:8").await;

        bus.publish(DomainEvent::NewMessage {
            dialog_id: 7,
            dialog_telegram_id: 700,
            message_id: 1,
            telegram_message_id: 10,
            text: Some("hi".into()),
            has_media: false,
        })
        .await;

        assert!(matches!(
            base.recv().await,
            Some(DomainEvent::NewMessage { dialog_id: 7, .. })
        ));
        assert!(matches!(
            specialized.recv().await,
            Some(DomainEvent::NewMessage { .. })
        ));
        // The other dialog channel saw nothing.
        drop(bus);
        assert!(other.recv().await.is_none());
    }

    #[tokio::test]
    async fn backfill_subscribers_receive_in_order() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe("backfill").await;

        for cursor in [300i64, 200, 100] {
            bus.publish(DomainEvent::BackfillProgress {
                dialog_id: 1,
                dialog_telegram_id: 1,
                cursor,
                pages_done: 1,
                messages_saved: 100,
                finished: false,
            })
            .await;
        }

        for expected in [300i64, 200, 100] {
            match stream.recv().await {
                Some(DomainEvent::BackfillProgress { cursor, .. }) => {
                    assert_eq!(cursor, expected)
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
