//! Named operation timing

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Identifies one running operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    /// Raw id value
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Accumulated timings for one operation name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OperationStats {
    /// Completed runs
    pub count: u64,
    /// Sum of all run durations
    pub total: Duration,
    /// Longest single run
    pub max: Duration,
}

impl OperationStats {
    /// Mean run duration, zero when nothing completed
    pub fn average(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total / count,
            Err(_) => Duration::from_nanos(
                u64::try_from(self.total.as_nanos() / u128::from(self.count))
                    .unwrap_or(u64::MAX),
            ),
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
    }
}

#[derive(Debug, Default)]
struct TimerState {
    next_id: u64,
    running: HashMap<OperationId, (String, Instant)>,
    finished: BTreeMap<String, OperationStats>,
}

/// Wall-clock timer for named operations
#[derive(Debug, Default)]
pub struct OperationTimer {
    state: Mutex<TimerState>,
}

impl OperationTimer {
    /// Creates an idle timer
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts timing `name`
    pub fn start(&self, name: &str) -> OperationId {
        let mut state = self.state.lock();
        let id = OperationId(state.next_id);
        state.next_id += 1;
        state.running.insert(id, (name.to_string(), Instant::now()));
        id
    }

    /// Stops a running operation, `None` for an unknown id
    pub fn end(&self, id: OperationId) -> Option<Duration> {
        let mut state = self.state.lock();
        let (name, started) = state.running.remove(&id)?;
        let elapsed = started.elapsed();

        if let Some(stats) = state.finished.get_mut(&name) {
            stats.record(elapsed);
        } else {
            let mut stats = OperationStats::default();
            stats.record(elapsed);
            state.finished.insert(name, stats);
        }

        Some(elapsed)
    }

    /// Totals per operation name, sorted by name
    pub fn stats(&self) -> BTreeMap<String, OperationStats> {
        self.state.lock().finished.clone()
    }

    /// Operations started but not ended
    pub fn running_count(&self) -> usize {
        self.state.lock().running.len()
    }

    /// Forgets finished totals; running operations keep going
    pub fn reset(&self) {
        self.state.lock().finished.clear();
    }
}

/// Ends an operation when dropped
#[must_use = "the operation ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct OperationGuard<'a> {
    timer: &'a OperationTimer,
    id: Option<OperationId>,
}

impl<'a> OperationGuard<'a> {
    pub(crate) fn new(timer: &'a OperationTimer, name: &str) -> Self {
        Self {
            id: Some(timer.start(name)),
            timer,
        }
    }

    /// Ends the operation now and returns its duration
    pub fn finish(mut self) -> Option<Duration> {
        self.id.take().and_then(|id| self.timer.end(id))
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.timer.end(id);
        }
    }
}
