use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::debug;
use ulid::Ulid;

use crate::limits::MAX_BLOCKS_PER_SCHEDULE;
use crate::model::*;
use crate::notify::{BlockEvent, NotifyHub};

use super::{RepositoryError, ScheduleRepository};

type SharedSchedule = Arc<RwLock<Schedule>>;

/// Call counters, mostly useful to assert what a caller did or did not send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryStats {
    pub lists: u64,
    pub creates: u64,
    pub deletes: u64,
}

/// In-process repository that behaves like the booking server: it assigns
/// ids and refuses overlapping bookings with `Conflict`.
pub struct MemoryRepository {
    schedules: DashMap<ScheduleKey, SharedSchedule>,
    /// Reverse lookup: block id → schedule key
    block_to_schedule: DashMap<BlockId, ScheduleKey>,
    notify: Arc<NotifyHub>,
    lists: AtomicU64,
    creates: AtomicU64,
    deletes: AtomicU64,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new(Arc::new(NotifyHub::new()))
    }
}

impl MemoryRepository {
    pub fn new(notify: Arc<NotifyHub>) -> Self {
        Self {
            schedules: DashMap::new(),
            block_to_schedule: DashMap::new(),
            notify,
            lists: AtomicU64::new(0),
            creates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.notify
    }

    pub fn stats(&self) -> RepositoryStats {
        RepositoryStats {
            lists: self.lists.load(Ordering::Relaxed),
            creates: self.creates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn get_schedule(&self, key: &ScheduleKey) -> Option<SharedSchedule> {
        self.schedules.get(key).map(|e| e.value().clone())
    }

    fn get_or_create_schedule(&self, key: &ScheduleKey) -> SharedSchedule {
        self.schedules
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(Schedule::new(key.clone()))))
            .clone()
    }
}

/// First stored block overlapping `interval`, if any.
fn find_conflict<'a>(schedule: &'a Schedule, interval: &Interval) -> Option<&'a TimeBlock> {
    schedule.overlapping(&interval.span).next()
}

#[async_trait]
impl ScheduleRepository for MemoryRepository {
    async fn list(&self, key: &ScheduleKey) -> Result<Vec<TimeBlock>, RepositoryError> {
        self.lists.fetch_add(1, Ordering::Relaxed);
        let Some(schedule) = self.get_schedule(key) else {
            return Ok(Vec::new());
        };
        let guard = schedule.read().await;
        Ok(guard.blocks().to_vec())
    }

    async fn create(&self, interval: &Interval) -> Result<TimeBlock, RepositoryError> {
        self.creates.fetch_add(1, Ordering::Relaxed);
        let key = interval.key();
        let schedule = self.get_or_create_schedule(&key);
        let mut guard = schedule.write().await;

        if let Some(existing) = find_conflict(&guard, interval) {
            debug!("refusing {} on {key}: overlaps block {}", interval.span, existing.id);
            return Err(RepositoryError::Conflict(Some(existing.id.clone())));
        }
        if guard.len() >= MAX_BLOCKS_PER_SCHEDULE {
            return Err(RepositoryError::Server {
                status: 422,
                message: "too many time blocks on this schedule".into(),
            });
        }

        let id = BlockId::parse(&Ulid::new().to_string())
            .map_err(|e| RepositoryError::Server { status: 500, message: e.to_string() })?;
        let block = TimeBlock::new(id.clone(), interval.clone());
        guard.insert(block.clone());
        drop(guard);

        self.block_to_schedule.insert(id, key);
        self.notify.send(&BlockEvent::Booked(block.clone()));
        Ok(block)
    }

    async fn delete(&self, id: &BlockId) -> Result<(), RepositoryError> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let key = self
            .block_to_schedule
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        let schedule = self
            .get_schedule(&key)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        let mut guard = schedule.write().await;
        if guard.remove(id).is_none() {
            return Err(RepositoryError::NotFound(id.clone()));
        }
        drop(guard);

        self.block_to_schedule.remove(id);
        self.notify.send(&BlockEvent::Cancelled { id: id.clone(), key });
        Ok(())
    }
}
