use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveTime;
use futures::future::join_all;
use tokio::sync::{Notify, broadcast};

use houseslot::model::*;
use houseslot::notify::{BlockEvent, NotifyHub};
use houseslot::repository::{MemoryRepository, RepositoryError, ScheduleRepository};
use houseslot::schedule::{Fetch, Phase, ScheduleError, Scheduler};

// ── Test infrastructure ──────────────────────────────────────

const DAY: &str = "2024-03-01";

fn key(resource: &str) -> ScheduleKey {
    ScheduleKey::new(ResourceId::parse(resource).unwrap(), parse_day(DAY).unwrap())
}

fn t(raw: &str) -> NaiveTime {
    parse_time(raw).unwrap()
}

fn owner(name: &str) -> OwnerId {
    OwnerId::parse(name).unwrap()
}

fn house() -> Vec<ResourceId> {
    ["Kitchen", "Washroom", "Hall"]
        .iter()
        .map(|l| ResourceId::parse(l).unwrap())
        .collect()
}

/// Wraps a repository and holds `list` calls for one resource until released.
struct SlowList {
    inner: Arc<MemoryRepository>,
    slow: ResourceId,
    gate: Notify,
}

#[async_trait]
impl ScheduleRepository for SlowList {
    async fn list(&self, key: &ScheduleKey) -> Result<Vec<TimeBlock>, RepositoryError> {
        let blocks = self.inner.list(key).await;
        if key.resource == self.slow {
            self.gate.notified().await;
        }
        blocks
    }

    async fn create(&self, interval: &Interval) -> Result<TimeBlock, RepositoryError> {
        self.inner.create(interval).await
    }

    async fn delete(&self, id: &BlockId) -> Result<(), RepositoryError> {
        self.inner.delete(id).await
    }
}

async fn next_event(rx: &mut broadcast::Receiver<BlockEvent>) -> BlockEvent {
    tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .expect("event not delivered")
        .unwrap()
}

// ── Scenarios ───────────────────────────────────────────────

#[tokio::test]
async fn roommates_share_a_location() {
    let repo = Arc::new(MemoryRepository::default());
    let alice = Scheduler::new(repo.clone(), house());
    let bob = Scheduler::new(repo.clone(), house());

    alice.select(key("Kitchen")).await.unwrap();
    alice.book(t("07:00"), t("08:00"), owner("alice")).await.unwrap();

    // Bob loads after Alice booked, so the overlap is caught locally.
    bob.select(key("Kitchen")).await.unwrap();
    let err = bob.book(t("07:30"), t("08:30"), owner("bob")).await.unwrap_err();
    assert!(matches!(err, ScheduleError::Overlap { .. }), "{err:?}");
    assert_eq!(repo.stats().creates, 1);

    bob.book(t("08:00"), t("09:00"), owner("bob")).await.unwrap();
    alice.refresh().await.unwrap();

    let owners: Vec<_> = alice
        .view()
        .blocks()
        .iter()
        .map(|b| b.interval.owner.to_string())
        .collect();
    assert_eq!(owners, ["alice", "bob"]);
}

#[tokio::test]
async fn concurrent_bookings_of_one_slot_admit_exactly_one() {
    let repo = Arc::new(MemoryRepository::default());
    let roommates: Vec<_> = (0..8)
        .map(|_| Scheduler::new(repo.clone(), house()))
        .collect();
    for r in &roommates {
        r.select(key("Washroom")).await.unwrap();
    }

    let results = join_all(
        roommates
            .iter()
            .enumerate()
            .map(|(i, r)| r.book(t("07:00"), t("07:30"), owner(&format!("r{i}")))),
    )
    .await;

    let booked = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(ScheduleError::Conflict(Some(_)))))
        .count();
    assert_eq!(booked, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(repo.list(&key("Washroom")).await.unwrap().len(), 1);
    for r in &roommates {
        assert_eq!(r.phase(), Phase::Ready);
    }
}

#[tokio::test]
async fn slow_fetch_for_previous_location_is_discarded() {
    let inner = Arc::new(MemoryRepository::default());
    inner
        .create(&Interval::parse("Kitchen", DAY, "07:00", "08:00", "alice").unwrap())
        .await
        .unwrap();
    inner
        .create(&Interval::parse("Hall", DAY, "18:00", "19:00", "bob").unwrap())
        .await
        .unwrap();
    let repo = Arc::new(SlowList {
        inner,
        slow: ResourceId::parse("Kitchen").unwrap(),
        gate: Notify::new(),
    });
    let scheduler = Arc::new(Scheduler::new(repo.clone(), house()));

    let kitchen = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.select(key("Kitchen")).await }
    });
    while scheduler.phase() != Phase::Loading {
        tokio::task::yield_now().await;
    }

    let hall = scheduler.select(key("Hall")).await.unwrap();
    assert!(matches!(hall, Fetch::Loaded(_)));

    repo.gate.notify_one();
    assert_eq!(kitchen.await.unwrap(), Ok(Fetch::Superseded));

    let view = scheduler.view();
    assert_eq!(view.key(), Some(key("Hall")));
    assert_eq!(view.phase, Phase::Ready);
    assert_eq!(view.blocks().len(), 1);
    assert_eq!(view.blocks()[0].interval.owner.as_str(), "bob");
}

#[tokio::test]
async fn bookings_and_removals_are_broadcast_per_schedule() {
    let hub = Arc::new(NotifyHub::new());
    let repo = Arc::new(MemoryRepository::new(hub.clone()));
    let mut kitchen = hub.subscribe(key("Kitchen"));
    let mut hall = hub.subscribe(key("Hall"));

    let scheduler = Scheduler::new(repo, house());
    scheduler.select(key("Kitchen")).await.unwrap();
    let block = scheduler.book(t("07:00"), t("08:00"), owner("alice")).await.unwrap();

    assert_eq!(next_event(&mut kitchen).await, BlockEvent::Booked(block.clone()));

    scheduler.remove(block.id.clone()).await.unwrap();
    assert_eq!(
        next_event(&mut kitchen).await,
        BlockEvent::Cancelled { id: block.id, key: key("Kitchen") }
    );
    assert!(hall.try_recv().is_err());
}

#[tokio::test]
async fn event_driven_refresh_picks_up_other_bookings() {
    let hub = Arc::new(NotifyHub::new());
    let repo = Arc::new(MemoryRepository::new(hub.clone()));
    let alice = Scheduler::new(repo.clone(), house());
    let bob = Scheduler::new(repo.clone(), house());
    alice.select(key("Hall")).await.unwrap();
    bob.select(key("Hall")).await.unwrap();
    let mut bob_events = hub.subscribe(key("Hall"));

    alice.book(t("20:00"), t("21:00"), owner("alice")).await.unwrap();
    let event = next_event(&mut bob_events).await;
    assert_eq!(event.key(), key("Hall"));

    let Fetch::Loaded(schedule) = bob.refresh().await.unwrap() else {
        panic!("expected a load");
    };
    assert_eq!(schedule.len(), 1);
    let err = bob.book(t("20:30"), t("21:30"), owner("bob")).await.unwrap_err();
    assert!(matches!(err, ScheduleError::Overlap { .. }));
}

#[tokio::test]
async fn removing_someone_elses_stale_block_fails_cleanly() {
    let repo = Arc::new(MemoryRepository::default());
    let alice = Scheduler::new(repo.clone(), house());
    let bob = Scheduler::new(repo.clone(), house());
    alice.select(key("Kitchen")).await.unwrap();
    let block = alice.book(t("07:00"), t("08:00"), owner("alice")).await.unwrap();
    bob.select(key("Kitchen")).await.unwrap();

    alice.remove(block.id.clone()).await.unwrap();

    let before = bob.view().schedule;
    let err = bob.remove(block.id.clone()).await.unwrap_err();
    assert_eq!(err, ScheduleError::Repository(RepositoryError::NotFound(block.id)));
    assert_eq!(bob.view().schedule, before);
}
