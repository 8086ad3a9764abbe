//! Tick-driven job scheduler for siege checkups, access reverts and cleanup.
//!
//! Jobs are plain data drained by a system each tick. A cancelled handle is
//! never drained again, but consumers still revalidate state before acting.

use bevy::prelude::Resource;

use crate::claim::ClaimId;
use crate::geometry::WorldId;
use crate::siege::SiegeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimJob {
    SiegeCheckup(SiegeId),
    CloseAccess { world: WorldId, claim: ClaimId },
    CleanupSweep,
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    handle: TaskHandle,
    due_at: u64,
    period: Option<u64>,
    job: ClaimJob,
}

#[derive(Resource, Debug, Default, Clone)]
pub struct TickScheduler {
    next_handle: u64,
    tasks: Vec<ScheduledTask>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` once, `delay_secs` after `now`.
    pub fn run_after(&mut self, now: u64, delay_secs: u64, job: ClaimJob) -> TaskHandle {
        self.push(now.saturating_add(delay_secs), None, job)
    }

    /// Run `job` every `period_secs`, first one period after `now`.
    pub fn run_periodically(&mut self, now: u64, period_secs: u64, job: ClaimJob) -> TaskHandle {
        let period = period_secs.max(1);
        self.push(now.saturating_add(period), Some(period), job)
    }

    /// Returns whether the handle was still pending.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.handle != handle);
        before != self.tasks.len()
    }

    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.tasks.iter().any(|task| task.handle == handle)
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Jobs due at or before `now`, oldest first. Periodic jobs are re-armed
    /// once per drain even if several periods elapsed.
    pub fn drain_due(&mut self, now: u64) -> Vec<(TaskHandle, ClaimJob)> {
        let mut due: Vec<(u64, TaskHandle, ClaimJob)> = Vec::new();
        self.tasks.retain_mut(|task| {
            if task.due_at > now {
                return true;
            }
            due.push((task.due_at, task.handle, task.job));
            match task.period {
                Some(period) => {
                    while task.due_at <= now {
                        task.due_at = task.due_at.saturating_add(period);
                    }
                    true
                }
                None => false,
            }
        });
        due.sort_by_key(|(due_at, handle, _)| (*due_at, *handle));
        due.into_iter().map(|(_, handle, job)| (handle, job)).collect()
    }

    fn push(&mut self, due_at: u64, period: Option<u64>, job: ClaimJob) -> TaskHandle {
        self.next_handle += 1;
        let handle = TaskHandle(self.next_handle);
        self.tasks.push(ScheduledTask {
            handle,
            due_at,
            period,
            job,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_jobs_fire_once() {
        let mut scheduler = TickScheduler::new();
        let handle = scheduler.run_after(100, 30, ClaimJob::CleanupSweep);
        assert!(scheduler.drain_due(129).is_empty());
        assert_eq!(scheduler.drain_due(130), vec![(handle, ClaimJob::CleanupSweep)]);
        assert!(scheduler.drain_due(1_000).is_empty());
        assert!(!scheduler.is_pending(handle));
    }

    #[test]
    fn periodic_jobs_rearm_without_backlog() {
        let mut scheduler = TickScheduler::new();
        let handle = scheduler.run_periodically(0, 10, ClaimJob::SiegeCheckup(SiegeId(1)));
        assert_eq!(scheduler.drain_due(10).len(), 1);
        assert_eq!(scheduler.drain_due(45).len(), 1);
        assert!(scheduler.drain_due(49).is_empty());
        assert_eq!(scheduler.drain_due(50).len(), 1);
        assert!(scheduler.is_pending(handle));
    }

    #[test]
    fn cancelled_jobs_never_drain() {
        let mut scheduler = TickScheduler::new();
        let handle = scheduler.run_periodically(0, 5, ClaimJob::SiegeCheckup(SiegeId(2)));
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert!(scheduler.drain_due(100).is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn due_jobs_come_out_in_time_order() {
        let mut scheduler = TickScheduler::new();
        let late = scheduler.run_after(0, 20, ClaimJob::CleanupSweep);
        let early = scheduler.run_after(0, 5, ClaimJob::SiegeCheckup(SiegeId(3)));
        let handles: Vec<TaskHandle> = scheduler.drain_due(30).into_iter().map(|(h, _)| h).collect();
        assert_eq!(handles, vec![early, late]);
    }
}
