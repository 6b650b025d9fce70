mod error;
mod validate;

pub use error::{ScheduleError, ValidationError};
pub use validate::validate;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::model::*;
use crate::observability::{
    BOOKINGS_TOTAL, FETCHES_TOTAL, REMOVALS_TOTAL, REPOSITORY_DURATION_SECONDS,
};
use crate::repository::ScheduleRepository;

/// Where the controller is with the selected schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing fully selected yet.
    Idle,
    Loading,
    Ready,
    Submitting,
    /// Last fetch failed. Data from an earlier fetch of the same schedule is kept.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Submitting => "submitting",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a fetch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Loaded(Schedule),
    /// A newer selection or refresh was issued while this one was in flight;
    /// its response was dropped.
    Superseded,
    /// Location or day still missing; nothing fetched.
    Incomplete,
}

/// Point-in-time copy of the controller state for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleView {
    pub resource: Option<ResourceId>,
    pub day: Option<NaiveDate>,
    pub phase: Phase,
    pub schedule: Option<Schedule>,
    pub last_error: Option<ScheduleError>,
    pub pending_removals: Vec<BlockId>,
}

impl ScheduleView {
    pub fn key(&self) -> Option<ScheduleKey> {
        Some(ScheduleKey::new(self.resource.clone()?, self.day?))
    }

    pub fn blocks(&self) -> &[TimeBlock] {
        match &self.schedule {
            Some(schedule) => schedule.blocks(),
            None => &[],
        }
    }
}

enum Replay {
    Created(TimeBlock),
    Removed(BlockId),
}

impl Replay {
    fn apply(self, schedule: &mut Schedule) {
        match self {
            Replay::Created(block) => {
                if block.interval.belongs_to(schedule.key()) && schedule.get(&block.id).is_none() {
                    schedule.insert(block);
                }
            }
            Replay::Removed(id) => {
                schedule.remove(&id);
            }
        }
    }
}

struct State {
    resource: Option<ResourceId>,
    day: Option<NaiveDate>,
    /// Bumped on every selection change and refresh. A fetch applies its
    /// result only if the counter still holds the value it was issued with.
    generation: u64,
    /// The latest issued fetch has not landed yet.
    fetching: bool,
    /// Mutations confirmed while `fetching`; replayed onto its response.
    replay: Vec<Replay>,
    /// A create is waiting on the repository. At most one at a time.
    submitting: bool,
    phase: Phase,
    /// Always belongs to the current selection when present.
    schedule: Option<Schedule>,
    last_error: Option<ScheduleError>,
    pending_removals: HashSet<BlockId>,
}

impl State {
    fn key(&self) -> Option<ScheduleKey> {
        Some(ScheduleKey::new(self.resource.clone()?, self.day?))
    }

    /// Start a fetch for the current selection, or go idle without one.
    fn issue_fetch(&mut self) -> Option<(u64, ScheduleKey)> {
        self.generation += 1;
        self.last_error = None;
        self.replay.clear();
        let Some(key) = self.key() else {
            self.fetching = false;
            self.schedule = None;
            self.phase = Phase::Idle;
            return None;
        };
        if self.schedule.as_ref().is_some_and(|s| s.key() != &key) {
            self.schedule = None;
        }
        self.fetching = true;
        self.phase = Phase::Loading;
        Some((self.generation, key))
    }

    /// Phase to settle in once nothing is loading.
    fn settled(&self) -> Phase {
        if self.submitting { Phase::Submitting } else { Phase::Ready }
    }

    /// Record a confirmed mutation so an older in-flight fetch cannot undo it.
    fn confirmed(&mut self, change: Replay) {
        if self.fetching {
            self.replay.push(change);
        }
    }
}

/// View-state controller for booking shared locations.
///
/// Owns the schedule of the selected (location, day) and is the only thing
/// that mutates it, and only when one of its own calls completes. Methods take
/// `&self` so that a selection change can overtake an in-flight fetch; the
/// state lock is never held across an await.
pub struct Scheduler {
    repo: Arc<dyn ScheduleRepository>,
    locations: Vec<ResourceId>,
    state: Mutex<State>,
}

impl Scheduler {
    /// The first location, if any, starts selected. An empty `locations`
    /// list accepts any location.
    pub fn new(repo: Arc<dyn ScheduleRepository>, locations: Vec<ResourceId>) -> Self {
        let state = State {
            resource: locations.first().cloned(),
            day: None,
            generation: 0,
            fetching: false,
            replay: Vec::new(),
            submitting: false,
            phase: Phase::Idle,
            schedule: None,
            last_error: None,
            pending_removals: HashSet::new(),
        };
        Self {
            repo,
            locations,
            state: Mutex::new(state),
        }
    }

    pub fn from_config(repo: Arc<dyn ScheduleRepository>, config: &Config) -> Self {
        Self::new(repo, config.locations.clone())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn locations(&self) -> &[ResourceId] {
        &self.locations
    }

    pub fn view(&self) -> ScheduleView {
        let st = self.lock();
        let mut pending_removals: Vec<BlockId> = st.pending_removals.iter().cloned().collect();
        pending_removals.sort();
        ScheduleView {
            resource: st.resource.clone(),
            day: st.day,
            phase: st.phase,
            schedule: st.schedule.clone(),
            last_error: st.last_error.clone(),
            pending_removals,
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub async fn select_resource(&self, resource: ResourceId) -> Result<Fetch, ScheduleError> {
        if !self.locations.is_empty() && !self.locations.contains(&resource) {
            return Err(ScheduleError::UnknownLocation(resource));
        }
        let issued = {
            let mut st = self.lock();
            st.resource = Some(resource);
            st.issue_fetch()
        };
        self.run_fetch(issued).await
    }

    pub async fn select_day(&self, day: NaiveDate) -> Result<Fetch, ScheduleError> {
        let issued = {
            let mut st = self.lock();
            st.day = Some(day);
            st.issue_fetch()
        };
        self.run_fetch(issued).await
    }

    /// Select location and day in one step (one fetch instead of two).
    pub async fn select(&self, key: ScheduleKey) -> Result<Fetch, ScheduleError> {
        if !self.locations.is_empty() && !self.locations.contains(&key.resource) {
            return Err(ScheduleError::UnknownLocation(key.resource));
        }
        let issued = {
            let mut st = self.lock();
            st.resource = Some(key.resource);
            st.day = Some(key.day);
            st.issue_fetch()
        };
        self.run_fetch(issued).await
    }

    /// Re-fetch the current selection. Overlapping refreshes coalesce: only
    /// the most recently issued one is applied.
    pub async fn refresh(&self) -> Result<Fetch, ScheduleError> {
        let issued = self.lock().issue_fetch();
        self.run_fetch(issued).await
    }

    async fn run_fetch(&self, issued: Option<(u64, ScheduleKey)>) -> Result<Fetch, ScheduleError> {
        let Some((generation, key)) = issued else {
            return Ok(Fetch::Incomplete);
        };
        debug!("fetching {key} (generation {generation})");

        let started = Instant::now();
        let result = self.repo.list(&key).await;
        metrics::histogram!(REPOSITORY_DURATION_SECONDS, "op" => "list")
            .record(started.elapsed().as_secs_f64());

        let mut guard = self.lock();
        let st = &mut *guard;
        if st.generation != generation {
            debug!("discarding stale response for {key} (generation {generation}, now {})", st.generation);
            metrics::counter!(FETCHES_TOTAL, "status" => "stale").increment(1);
            return Ok(Fetch::Superseded);
        }

        st.fetching = false;
        let replay = std::mem::take(&mut st.replay);
        match result {
            Ok(blocks) => {
                let mut schedule = Schedule::from_blocks(key, blocks);
                if !replay.is_empty() {
                    debug!("replaying {} confirmed changes onto {}", replay.len(), schedule.key());
                }
                for change in replay {
                    change.apply(&mut schedule);
                }
                info!("loaded {} with {} blocks", schedule.key(), schedule.len());
                metrics::counter!(FETCHES_TOTAL, "status" => "ok").increment(1);
                st.schedule = Some(schedule.clone());
                st.phase = st.settled();
                Ok(Fetch::Loaded(schedule))
            }
            Err(e) => {
                warn!("fetching {key} failed: {e}");
                metrics::counter!(FETCHES_TOTAL, "status" => "error").increment(1);
                let err = ScheduleError::from(e);
                st.phase = Phase::Failed;
                st.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Book `[start, end)` on the selected location and day.
    pub async fn book(
        &self,
        start: NaiveTime,
        end: NaiveTime,
        owner: OwnerId,
    ) -> Result<TimeBlock, ScheduleError> {
        let key = self.lock().key().ok_or(ScheduleError::NoSelection)?;
        let candidate = match Interval::new(key.resource, key.day, start, end, owner) {
            Ok(candidate) => candidate,
            Err(e) => {
                metrics::counter!(BOOKINGS_TOTAL, "outcome" => "invalid").increment(1);
                let err = ScheduleError::Invalid(e);
                self.lock().last_error = Some(err.clone());
                return Err(err);
            }
        };
        self.create(candidate).await
    }

    /// Validate `candidate` against the held schedule, then ask the
    /// repository to persist it. The repository is not contacted when
    /// validation fails.
    pub async fn create(&self, candidate: Interval) -> Result<TimeBlock, ScheduleError> {
        let key = candidate.key();
        {
            let mut guard = self.lock();
            let st = &mut *guard;
            let selected = st.key();
            if selected.as_ref() != Some(&key) {
                return Err(ScheduleError::SelectionMismatch {
                    selected,
                    requested: key,
                });
            }
            if st.submitting {
                return Err(ScheduleError::NotReady(Phase::Submitting));
            }
            let verdict = match (&st.phase, &st.schedule) {
                (Phase::Ready, Some(schedule)) => validate(&candidate, schedule),
                (phase, _) => return Err(ScheduleError::NotReady(*phase)),
            };
            if let Err(e) = verdict {
                let err = ScheduleError::from(e);
                info!("rejected {} on {key}: {err}", candidate.span);
                metrics::counter!(BOOKINGS_TOTAL, "outcome" => err.kind()).increment(1);
                st.last_error = Some(err.clone());
                return Err(err);
            }
            st.submitting = true;
            st.phase = Phase::Submitting;
            st.last_error = None;
        }

        let started = Instant::now();
        let result = self.repo.create(&candidate).await;
        metrics::histogram!(REPOSITORY_DURATION_SECONDS, "op" => "create")
            .record(started.elapsed().as_secs_f64());

        let mut guard = self.lock();
        let st = &mut *guard;
        st.submitting = false;
        if st.phase == Phase::Submitting {
            st.phase = Phase::Ready;
        }

        match result {
            Ok(block) => {
                info!("booked {} on {key} for {} as {}", block.span(), block.interval.owner, block.id);
                metrics::counter!(BOOKINGS_TOTAL, "outcome" => "created").increment(1);
                if st.key().as_ref() == Some(&key) {
                    if let Some(schedule) = st.schedule.as_mut() {
                        Replay::Created(block.clone()).apply(schedule);
                    }
                    st.confirmed(Replay::Created(block.clone()));
                } else {
                    debug!("selection moved on; not merging {}", block.id);
                }
                Ok(block)
            }
            Err(e) => {
                let err = ScheduleError::from(e);
                warn!("booking {} on {key} failed: {err}", candidate.span);
                metrics::counter!(BOOKINGS_TOTAL, "outcome" => err.kind()).increment(1);
                st.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Delete a block. The held schedule changes only if the repository
    /// confirms; a second removal of the same block while one is in flight
    /// is refused.
    pub async fn remove(&self, id: BlockId) -> Result<(), ScheduleError> {
        let first = self.lock().pending_removals.insert(id.clone());
        if !first {
            metrics::counter!(REMOVALS_TOTAL, "outcome" => "pending").increment(1);
            return Err(ScheduleError::RemovalPending(id));
        }

        let started = Instant::now();
        let result = self.repo.delete(&id).await;
        metrics::histogram!(REPOSITORY_DURATION_SECONDS, "op" => "delete")
            .record(started.elapsed().as_secs_f64());

        let mut st = self.lock();
        st.pending_removals.remove(&id);
        match result {
            Ok(()) => {
                info!("removed block {id}");
                metrics::counter!(REMOVALS_TOTAL, "outcome" => "removed").increment(1);
                if let Some(schedule) = st.schedule.as_mut() {
                    schedule.remove(&id);
                }
                st.confirmed(Replay::Removed(id));
                Ok(())
            }
            Err(e) => {
                let err = ScheduleError::from(e);
                warn!("removing block {id} failed: {err}");
                metrics::counter!(REMOVALS_TOTAL, "outcome" => err.kind()).increment(1);
                st.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}
