// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for learning events
//
// In-memory event streaming over tokio broadcast channels. Events published
// with no subscribers are dropped; slow subscribers observe `Lagged`.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::CortexEvent;

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<CortexEvent>>,
}

impl EventBus {
    /// Capacity is how many events are buffered before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: CortexEvent) {
        debug!(event_type = event.event_type(), "Publishing event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            filter: None,
        }
    }

    /// Subscribe to events whose `event_type()` is in `event_types`
    pub fn subscribe_to(&self, event_types: &[&'static str]) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            filter: Some(event_types.to_vec()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<CortexEvent>,
    filter: Option<Vec<&'static str>>,
}

impl EventReceiver {
    fn wanted(&self, event: &CortexEvent) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|types| types.contains(&event.event_type()))
    }

    /// Wait for the next event that passes this receiver's filter
    pub async fn recv(&mut self) -> Result<CortexEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.wanted(&event) {
                return Ok(event);
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<CortexEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.wanted(&event) {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
