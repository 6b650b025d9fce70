use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{BlockId, ScheduleKey, TimeBlock};

const CHANNEL_CAPACITY: usize = 256;

/// A change to one schedule, as seen by the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEvent {
    Booked(TimeBlock),
    Cancelled { id: BlockId, key: ScheduleKey },
}

impl BlockEvent {
    pub fn key(&self) -> ScheduleKey {
        match self {
            BlockEvent::Booked(block) => block.interval.key(),
            BlockEvent::Cancelled { key, .. } => key.clone(),
        }
    }
}

/// Broadcast hub for schedule changes, one channel per (location, day).
pub struct NotifyHub {
    channels: DashMap<ScheduleKey, broadcast::Sender<BlockEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes on a schedule. Creates the channel if needed.
    pub fn subscribe(&self, key: ScheduleKey) -> broadcast::Receiver<BlockEvent> {
        let sender = self
            .channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: &BlockEvent) {
        if let Some(sender) = self.channels.get(&event.key()) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
