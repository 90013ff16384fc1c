//! Offline schedule construction and the time-triggered worker
//!
//! Lifecycle: `Configuring` (tasks may be added) -> `Finalized` (static
//! table computed exactly once) -> `Running` (single worker replays the
//! table) -> `Stopped`. Admission is checked per task at `add_task` and
//! globally at `finalize`; placement defers conflicting instances in BTU
//! steps rather than preempting.

use super::task::{ScheduledExecution, TaskDefinition, TaskFn, TaskMetrics, TaskSpec};
use crate::core::time::{lcm, sleep_until};
use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Default basic time unit when none is configured.
const DEFAULT_BTU: Duration = Duration::from_micros(100);

/// Hyperperiods beyond this provoke a warning during computation.
const HYPERPERIOD_CEILING: Duration = Duration::from_secs(60);

/// Outcome of schedule finalization or task-set validation.
#[derive(Debug, Clone)]
pub struct SchedulabilityReport {
    /// False iff any admission test failed or any instance failed to
    /// place.
    pub schedulable: bool,
    pub hyperperiod: Duration,
    pub basic_time_unit: Duration,
    pub utilization: f64,
    pub total_instances: usize,
    pub conflicts: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Configuring,
    Finalized,
    Running,
    Stopped,
}

/// Static, offline-scheduled executor of periodic tasks.
pub struct TtScheduler {
    btu: Duration,
    state: State,
    specs: Vec<TaskSpec>,
    functions: Vec<TaskFn>,
    name_to_id: HashMap<String, usize>,
    hyperperiod: Duration,
    schedulable: bool,
    table: Arc<Vec<ScheduledExecution>>,
    metrics: Arc<Vec<Mutex<TaskMetrics>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TtScheduler {
    /// Create a scheduler with the given basic time unit.
    ///
    /// Non-positive quanta fall back to the 100 microsecond default.
    pub fn new(basic_time_unit: Duration) -> Self {
        let btu = if basic_time_unit.is_zero() {
            DEFAULT_BTU
        } else {
            basic_time_unit
        };
        Self {
            btu,
            state: State::Configuring,
            specs: Vec::new(),
            functions: Vec::new(),
            name_to_id: HashMap::new(),
            hyperperiod: Duration::ZERO,
            schedulable: false,
            table: Arc::new(Vec::new()),
            metrics: Arc::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Register a task. Only legal while configuring.
    pub fn add_task(&mut self, task: TaskDefinition) -> Result<()> {
        if self.state != State::Configuring {
            bail!("cannot add task '{}' after finalization", task.spec.name);
        }
        if self.name_to_id.contains_key(&task.spec.name) {
            bail!("task name '{}' already exists", task.spec.name);
        }
        check_spec(&task.spec, self.btu)?;

        let id = self.specs.len();
        self.name_to_id.insert(task.spec.name.clone(), id);
        self.specs.push(task.spec);
        self.functions.push(task.function);
        Ok(())
    }

    /// Compute the static schedule table. Callable exactly once; a second
    /// call is rejected regardless of the first outcome.
    pub fn finalize(&mut self) -> Result<SchedulabilityReport> {
        if self.state != State::Configuring {
            bail!("schedule already finalized");
        }
        self.state = State::Finalized;

        let (report, table) = build_schedule(&self.specs, self.btu);
        self.hyperperiod = report.hyperperiod;
        self.schedulable = report.schedulable;
        self.table = Arc::new(table);
        self.metrics = Arc::new(
            self.specs
                .iter()
                .map(|_| Mutex::new(TaskMetrics::default()))
                .collect(),
        );
        Ok(report)
    }

    /// Start the worker thread replaying the finalized table.
    ///
    /// Entered at most once per scheduler; fails when the table is
    /// missing, unschedulable or the scheduler was already started.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            State::Configuring => bail!("no schedule available, call finalize() first"),
            State::Running => bail!("scheduler already running"),
            State::Stopped => bail!("scheduler was stopped and cannot be restarted"),
            State::Finalized => {}
        }
        if !self.schedulable || self.table.is_empty() {
            bail!("task set is not schedulable");
        }

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let table = Arc::clone(&self.table);
        let metrics = Arc::clone(&self.metrics);
        let specs = self.specs.clone();
        let mut functions = std::mem::take(&mut self.functions);
        let hyperperiod = self.hyperperiod;

        let worker = std::thread::Builder::new()
            .name("alaris-tta".into())
            .spawn(move || {
                let mut anchor = Instant::now();
                while running.load(Ordering::Acquire) {
                    execute_hyperperiod(
                        anchor,
                        &table,
                        &specs,
                        &mut functions,
                        &metrics,
                        &running,
                    );
                    anchor += hyperperiod;
                }
            })?;
        self.worker = Some(worker);
        self.state = State::Running;
        info!(
            hyperperiod_ms = self.hyperperiod.as_millis() as u64,
            entries = self.table.len(),
            "time-triggered scheduler started"
        );
        Ok(())
    }

    /// Stop the worker and join it. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.join() {
                error!(?e, "scheduler worker panicked");
            }
            self.state = State::Stopped;
        }
    }

    /// Execute one complete hyperperiod synchronously.
    ///
    /// Intended for tests and validation runs; only legal on a finalized,
    /// schedulable, not-yet-started scheduler.
    pub fn run_one_hyperperiod(&mut self) -> Result<()> {
        if self.state != State::Finalized {
            bail!("run_one_hyperperiod requires a finalized, not-started scheduler");
        }
        if !self.schedulable {
            bail!("task set is not schedulable");
        }
        let keep_going = AtomicBool::new(true);
        execute_hyperperiod(
            Instant::now(),
            &self.table,
            &self.specs,
            &mut self.functions,
            &self.metrics,
            &keep_going,
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn hyperperiod(&self) -> Duration {
        self.hyperperiod
    }

    pub fn basic_time_unit(&self) -> Duration {
        self.btu
    }

    pub fn task_count(&self) -> usize {
        self.specs.len()
    }

    /// The finalized table, sorted by start offset.
    pub fn schedule_table(&self) -> &[ScheduledExecution] {
        &self.table
    }

    /// Snapshot of one task's runtime metrics.
    pub fn task_metrics(&self, task_id: usize) -> Option<TaskMetrics> {
        self.metrics.get(task_id).map(|m| *m.lock())
    }

    pub fn task_metrics_by_name(&self, name: &str) -> Option<TaskMetrics> {
        self.name_to_id
            .get(name)
            .and_then(|&id| self.task_metrics(id))
    }

    /// Emit the schedule table through tracing, one row per entry.
    pub fn log_schedule_table(&self) {
        info!(
            hyperperiod_ms = self.hyperperiod.as_millis() as u64,
            btu_us = self.btu.as_micros() as u64,
            "schedule table"
        );
        for entry in self.table.iter() {
            let name = &self.specs[entry.task_id].name;
            info!(
                task = %name,
                start_us = entry.start_offset.as_micros() as u64,
                end_us = entry.end_offset.as_micros() as u64,
                instance = entry.instance,
                "schedule entry"
            );
        }
    }

    /// Validate a task set without retaining a scheduler.
    pub fn validate_task_set(specs: &[TaskSpec], basic_time_unit: Duration) -> SchedulabilityReport {
        let btu = if basic_time_unit.is_zero() {
            DEFAULT_BTU
        } else {
            basic_time_unit
        };
        for spec in specs {
            if let Err(e) = check_spec(spec, btu) {
                return SchedulabilityReport {
                    schedulable: false,
                    hyperperiod: Duration::ZERO,
                    basic_time_unit: btu,
                    utilization: 0.0,
                    total_instances: 0,
                    conflicts: vec![format!("invalid task: {e}")],
                    warnings: Vec::new(),
                };
            }
        }
        build_schedule(specs, btu).0
    }
}

impl Drop for TtScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-task admission tests.
fn check_spec(spec: &TaskSpec, btu: Duration) -> Result<()> {
    if spec.period.is_zero() {
        bail!("task '{}' must have a positive period", spec.name);
    }
    if spec.period.as_nanos() % btu.as_nanos() != 0 {
        bail!(
            "task '{}' period must be a multiple of the basic time unit",
            spec.name
        );
    }
    if spec.wcet > spec.period {
        bail!("task '{}' WCET exceeds its period", spec.name);
    }
    if spec.deadline > spec.period {
        bail!("task '{}' deadline exceeds its period", spec.name);
    }
    Ok(())
}

fn compute_hyperperiod(specs: &[TaskSpec], btu: Duration) -> Duration {
    if specs.is_empty() {
        return btu;
    }
    let mut hp = specs[0].period;
    for spec in &specs[1..] {
        hp = lcm(hp, spec.period);
        if hp > HYPERPERIOD_CEILING {
            warn!(
                hyperperiod_ms = hp.as_millis() as u64,
                "hyperperiod exceeds the 60 s operational ceiling"
            );
        }
    }
    hp
}

#[inline]
fn overlaps(a: &ScheduledExecution, b: &ScheduledExecution) -> bool {
    !(a.end_offset <= b.start_offset || b.end_offset <= a.start_offset)
}

/// Enumerate, sort and place all task instances inside the hyperperiod.
///
/// Conflicting instances are deferred forward in BTU steps while their
/// deadline permits; instances that cannot be placed are reported.
fn build_table(
    specs: &[TaskSpec],
    btu: Duration,
    hyperperiod: Duration,
) -> (Vec<ScheduledExecution>, Vec<String>) {
    let mut candidates: Vec<ScheduledExecution> = Vec::new();
    for (task_id, spec) in specs.iter().enumerate() {
        let count = (hyperperiod.as_nanos() / spec.period.as_nanos()) as u64;
        for instance in 0..count {
            let start = Duration::from_nanos(spec.period.as_nanos() as u64 * instance);
            candidates.push(ScheduledExecution {
                task_id,
                start_offset: start,
                end_offset: start + spec.wcet,
                instance,
            });
        }
    }

    // Release offset ascending; at equal release, higher priority first.
    candidates.sort_by(|a, b| {
        a.start_offset
            .cmp(&b.start_offset)
            .then_with(|| specs[b.task_id].priority.cmp(&specs[a.task_id].priority))
    });

    let mut table: Vec<ScheduledExecution> = Vec::new();
    let mut conflicts: Vec<String> = Vec::new();

    for candidate in candidates {
        let spec = &specs[candidate.task_id];
        let incumbent = table.iter().find(|placed| overlaps(&candidate, placed));

        let Some(incumbent) = incumbent else {
            table.push(candidate);
            continue;
        };

        if spec.priority > specs[incumbent.task_id].priority {
            // Preemption is not part of this model; the higher-priority
            // instance is deferred like any other.
            warn!(
                task = %spec.name,
                incumbent = %specs[incumbent.task_id].name,
                "higher-priority task would preempt; deferring instead"
            );
        }

        let release = candidate.start_offset;
        let mut next = candidate.start_offset;
        let mut placed = false;
        while next < hyperperiod {
            next += btu;
            let moved = ScheduledExecution {
                start_offset: next,
                end_offset: next + spec.wcet,
                ..candidate
            };
            if moved.end_offset > release + spec.deadline {
                conflicts.push(format!(
                    "cannot defer task '{}' instance {} without missing its deadline",
                    spec.name, candidate.instance
                ));
                break;
            }
            if !table.iter().any(|entry| overlaps(&moved, entry)) {
                table.push(moved);
                placed = true;
                break;
            }
        }
        if !placed && next >= hyperperiod {
            conflicts.push(format!(
                "no free slot for task '{}' instance {} before the hyperperiod ends",
                spec.name, candidate.instance
            ));
        }
    }

    table.sort_by_key(|e| e.start_offset);
    (table, conflicts)
}

/// Full admission + placement pipeline shared by `finalize` and
/// `validate_task_set`.
fn build_schedule(specs: &[TaskSpec], btu: Duration) -> (SchedulabilityReport, Vec<ScheduledExecution>) {
    let mut report = SchedulabilityReport {
        schedulable: false,
        hyperperiod: Duration::ZERO,
        basic_time_unit: btu,
        utilization: 0.0,
        total_instances: 0,
        conflicts: Vec::new(),
        warnings: Vec::new(),
    };

    if specs.is_empty() {
        report.conflicts.push("no tasks defined".to_string());
        return (report, Vec::new());
    }

    let hyperperiod = compute_hyperperiod(specs, btu);
    report.hyperperiod = hyperperiod;

    let utilization: f64 = specs.iter().map(TaskSpec::utilization).sum();
    report.utilization = utilization;

    if utilization > 1.0 {
        report.conflicts.push(format!(
            "total utilization {utilization:.3} exceeds 1.0"
        ));
        return (report, Vec::new());
    }

    // Liu & Layland bound is advisory under static scheduling.
    let n = specs.len() as f64;
    let liu_layland = n * (2f64.powf(1.0 / n) - 1.0);
    if utilization > liu_layland {
        report.warnings.push(format!(
            "utilization {utilization:.3} exceeds the Liu-Layland bound {liu_layland:.3}"
        ));
    }

    let (table, mut placement_conflicts) = build_table(specs, btu, hyperperiod);
    report.conflicts.append(&mut placement_conflicts);

    let expected: u64 = specs
        .iter()
        .map(|s| (hyperperiod.as_nanos() / s.period.as_nanos()) as u64)
        .sum();
    report.total_instances = table.len();

    if (table.len() as u64) < expected {
        report
            .conflicts
            .push("some task instances could not be scheduled".to_string());
        return (report, table);
    }

    report.schedulable = true;
    if utilization > 0.8 {
        report
            .warnings
            .push(format!("high utilization: {:.1}%", utilization * 100.0));
    }
    if hyperperiod > Duration::from_secs(10) {
        report.warnings.push(format!(
            "long hyperperiod: {} ms",
            hyperperiod.as_millis()
        ));
    }
    (report, table)
}

/// Replay one hyperperiod of the table against `anchor`.
///
/// Cancellation is observed between entries only; a task that is already
/// executing always runs to completion.
fn execute_hyperperiod(
    anchor: Instant,
    table: &[ScheduledExecution],
    specs: &[TaskSpec],
    functions: &mut [TaskFn],
    metrics: &[Mutex<TaskMetrics>],
    running: &AtomicBool,
) {
    for entry in table {
        if !running.load(Ordering::Acquire) {
            break;
        }
        sleep_until(anchor + entry.start_offset);

        let spec = &specs[entry.task_id];
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| (functions[entry.task_id])()));
        let ended = Instant::now();
        if outcome.is_err() {
            error!(task = %spec.name, "task panicked; schedule continues");
        }

        let elapsed = ended - started;
        {
            let mut m = metrics[entry.task_id].lock();
            m.executions_completed += 1;
            m.total_execution_time += elapsed;
            m.max_execution_time = m.max_execution_time.max(elapsed);
            m.last_execution_time = elapsed;

            let release =
                anchor + Duration::from_nanos(spec.period.as_nanos() as u64 * entry.instance);
            if ended.saturating_duration_since(release) > spec.deadline {
                m.deadline_misses += 1;
                warn!(task = %spec.name, instance = entry.instance, "deadline miss");
            }
        }

        if elapsed > spec.wcet {
            warn!(
                task = %spec.name,
                actual_us = elapsed.as_micros() as u64,
                wcet_us = spec.wcet.as_micros() as u64,
                "execution exceeded declared WCET"
            );
        }
    }
}

/// Fluent helper for assembling and validating task sets.
pub struct TaskSetBuilder {
    btu: Duration,
    tasks: Vec<TaskDefinition>,
}

impl TaskSetBuilder {
    pub fn new(basic_time_unit: Duration) -> Self {
        Self {
            btu: basic_time_unit,
            tasks: Vec::new(),
        }
    }

    /// Add an ordinary periodic task.
    pub fn periodic(
        mut self,
        name: impl Into<String>,
        function: impl FnMut() + Send + 'static,
        period: Duration,
        wcet: Duration,
        priority: i32,
    ) -> Self {
        let spec = TaskSpec::new(name, period, wcet).with_priority(priority);
        self.tasks.push(TaskDefinition::new(spec, function));
        self
    }

    /// Add a critical task (priority 100, critical flag set).
    pub fn critical(
        mut self,
        name: impl Into<String>,
        function: impl FnMut() + Send + 'static,
        period: Duration,
        wcet: Duration,
    ) -> Self {
        let spec = TaskSpec::new(name, period, wcet)
            .with_priority(100)
            .critical();
        self.tasks.push(TaskDefinition::new(spec, function));
        self
    }

    /// Validate the accumulated set without building a scheduler.
    pub fn validate(&self) -> SchedulabilityReport {
        let specs: Vec<TaskSpec> = self.tasks.iter().map(|t| t.spec.clone()).collect();
        TtScheduler::validate_task_set(&specs, self.btu)
    }

    /// Move every task into `scheduler` and finalize it.
    pub fn build_into(self, scheduler: &mut TtScheduler) -> Result<SchedulabilityReport> {
        for task in self.tasks {
            scheduler.add_task(task)?;
        }
        scheduler.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn noop() -> impl FnMut() + Send + 'static {
        || {}
    }

    #[test]
    fn test_three_task_set_is_schedulable() {
        // A: P=10ms W=2ms prio 10, B: P=20ms W=3ms prio 5,
        // C: P=50ms W=4ms prio 1, BTU = 1ms.
        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("A", ms(10), ms(2)).with_priority(10),
                noop(),
            ))
            .unwrap();
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("B", ms(20), ms(3)).with_priority(5),
                noop(),
            ))
            .unwrap();
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("C", ms(50), ms(4)).with_priority(1),
                noop(),
            ))
            .unwrap();

        let report = sched.finalize().unwrap();
        assert!(report.schedulable, "conflicts: {:?}", report.conflicts);
        assert_eq!(report.hyperperiod, ms(100));
        assert!((report.utilization - 0.43).abs() < 1e-9);
        assert_eq!(report.total_instances, 17);
        assert_eq!(sched.schedule_table().len(), 17);
    }

    #[test]
    fn test_overloaded_set_is_rejected() {
        // U = 0.8 + 0.5 = 1.3 > 1.
        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(TaskSpec::new("A", ms(10), ms(8)), noop()))
            .unwrap();
        sched
            .add_task(TaskDefinition::new(TaskSpec::new("B", ms(10), ms(5)), noop()))
            .unwrap();

        let report = sched.finalize().unwrap();
        assert!(!report.schedulable);
        assert!(sched.schedule_table().is_empty());
        assert!(report.conflicts.iter().any(|c| c.contains("utilization")));
        assert!(sched.start().is_err());
    }

    #[test]
    fn test_full_utilization_is_accepted() {
        // Two tasks at combined utilization exactly 1.0, scheduled
        // back-to-back inside a 2ms hyperperiod.
        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(TaskSpec::new("A", ms(2), ms(1)), noop()))
            .unwrap();
        sched
            .add_task(TaskDefinition::new(TaskSpec::new("B", ms(2), ms(1)), noop()))
            .unwrap();

        let report = sched.finalize().unwrap();
        assert!(report.schedulable, "conflicts: {:?}", report.conflicts);
        assert!((report.utilization - 1.0).abs() < 1e-9);
        assert_eq!(report.total_instances, 2);

        let table = sched.schedule_table();
        assert_eq!(table[0].start_offset, ms(0));
        assert_eq!(table[0].end_offset, ms(1));
        assert_eq!(table[1].start_offset, ms(1));
        assert_eq!(table[1].end_offset, ms(2));
    }

    #[test]
    fn test_schedule_intervals_are_disjoint_and_btu_aligned() {
        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("A", ms(10), ms(2)).with_priority(10),
                noop(),
            ))
            .unwrap();
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("B", ms(20), ms(3)).with_priority(5),
                noop(),
            ))
            .unwrap();
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("C", ms(50), ms(4)).with_priority(1),
                noop(),
            ))
            .unwrap();
        sched.finalize().unwrap();

        let table = sched.schedule_table();
        let btu_ns = ms(1).as_nanos();
        for (i, a) in table.iter().enumerate() {
            assert_eq!(a.start_offset.as_nanos() % btu_ns, 0, "start not BTU-aligned");
            let spec_a = a.task_id;
            let release = Duration::from_nanos(
                sched.specs[spec_a].period.as_nanos() as u64 * a.instance,
            );
            assert!(
                a.end_offset <= release + sched.specs[spec_a].deadline,
                "entry ends after its deadline"
            );
            for b in table.iter().skip(i + 1) {
                assert!(
                    a.end_offset <= b.start_offset || b.end_offset <= a.start_offset,
                    "overlapping schedule entries"
                );
            }
        }
    }

    #[test]
    fn test_rejects_period_not_multiple_of_btu() {
        let mut sched = TtScheduler::new(ms(1));
        let result = sched.add_task(TaskDefinition::new(
            TaskSpec::new("odd", Duration::from_micros(1500), Duration::from_micros(100)),
            noop(),
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_wcet_and_deadline_exceeding_period() {
        let mut sched = TtScheduler::new(ms(1));
        assert!(sched
            .add_task(TaskDefinition::new(TaskSpec::new("w", ms(5), ms(6)), noop()))
            .is_err());
        assert!(sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("d", ms(5), ms(1)).with_deadline(ms(7)),
                noop(),
            ))
            .is_err());
    }

    #[test]
    fn test_duplicate_task_name_rejected() {
        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(TaskSpec::new("dup", ms(10), ms(1)), noop()))
            .unwrap();
        assert!(sched
            .add_task(TaskDefinition::new(TaskSpec::new("dup", ms(20), ms(1)), noop()))
            .is_err());
    }

    #[test]
    fn test_add_after_finalize_rejected() {
        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(TaskSpec::new("a", ms(10), ms(1)), noop()))
            .unwrap();
        sched.finalize().unwrap();
        assert!(sched
            .add_task(TaskDefinition::new(TaskSpec::new("b", ms(10), ms(1)), noop()))
            .is_err());
    }

    #[test]
    fn test_second_finalize_rejected() {
        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(TaskSpec::new("a", ms(10), ms(1)), noop()))
            .unwrap();
        sched.finalize().unwrap();
        assert!(sched.finalize().is_err());
    }

    #[test]
    fn test_empty_task_set_unschedulable() {
        let mut sched = TtScheduler::new(ms(1));
        let report = sched.finalize().unwrap();
        assert!(!report.schedulable);
        assert!(report.conflicts.iter().any(|c| c.contains("no tasks")));
    }

    #[test]
    fn test_run_one_hyperperiod_executes_every_instance() {
        let counter_a = Arc::new(AtomicU64::new(0));
        let counter_b = Arc::new(AtomicU64::new(0));
        let (ca, cb) = (Arc::clone(&counter_a), Arc::clone(&counter_b));

        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("a", ms(5), ms(1)).with_priority(2),
                move || {
                    ca.fetch_add(1, Ordering::Relaxed);
                },
            ))
            .unwrap();
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("b", ms(10), ms(1)).with_priority(1),
                move || {
                    cb.fetch_add(1, Ordering::Relaxed);
                },
            ))
            .unwrap();

        let report = sched.finalize().unwrap();
        assert!(report.schedulable);
        assert_eq!(report.hyperperiod, ms(10));

        sched.run_one_hyperperiod().unwrap();
        assert_eq!(counter_a.load(Ordering::Relaxed), 2);
        assert_eq!(counter_b.load(Ordering::Relaxed), 1);

        let metrics = sched.task_metrics_by_name("a").unwrap();
        assert_eq!(metrics.executions_completed, 2);
        assert!(metrics.max_execution_time >= metrics.last_execution_time);
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);

        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("tick", ms(5), ms(1)),
                move || {
                    c.fetch_add(1, Ordering::Relaxed);
                },
            ))
            .unwrap();
        assert!(sched.finalize().unwrap().schedulable);

        sched.start().unwrap();
        assert!(sched.is_running());
        assert!(sched.start().is_err(), "second start must fail");

        std::thread::sleep(ms(30));
        sched.stop();
        assert!(!sched.is_running());
        let after_stop = counter.load(Ordering::Relaxed);
        assert!(after_stop > 0, "worker never ran");

        // Idempotent stop, and no restarts after stopping.
        sched.stop();
        assert!(sched.start().is_err());
    }

    #[test]
    fn test_panicking_task_does_not_kill_schedule() {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);

        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("bad", ms(10), ms(1)).with_priority(5),
                || panic!("task failure"),
            ))
            .unwrap();
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("good", ms(10), ms(1)).with_priority(1),
                move || {
                    c.fetch_add(1, Ordering::Relaxed);
                },
            ))
            .unwrap();
        sched.finalize().unwrap();
        sched.run_one_hyperperiod().unwrap();

        assert_eq!(counter.load(Ordering::Relaxed), 1);
        let bad = sched.task_metrics_by_name("bad").unwrap();
        assert_eq!(bad.executions_completed, 1);
    }

    #[test]
    fn test_conflicting_release_defers_lower_priority() {
        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("hi", ms(10), ms(2)).with_priority(10),
                noop(),
            ))
            .unwrap();
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("lo", ms(10), ms(2)).with_priority(1),
                noop(),
            ))
            .unwrap();
        sched.finalize().unwrap();

        let table = sched.schedule_table();
        assert_eq!(table.len(), 2);
        // High priority keeps its release; low priority is deferred to
        // the next free BTU-aligned slot.
        assert_eq!(table[0].start_offset, ms(0));
        assert_eq!(sched.specs[table[0].task_id].name, "hi");
        assert_eq!(table[1].start_offset, ms(2));
        assert_eq!(sched.specs[table[1].task_id].name, "lo");
    }

    #[test]
    fn test_tight_deadline_makes_set_unschedulable() {
        let mut sched = TtScheduler::new(ms(1));
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("hi", ms(10), ms(4)).with_priority(10),
                noop(),
            ))
            .unwrap();
        // Same release, but the deadline leaves no room after deferral.
        sched
            .add_task(TaskDefinition::new(
                TaskSpec::new("lo", ms(10), ms(4))
                    .with_priority(1)
                    .with_deadline(ms(5)),
                noop(),
            ))
            .unwrap();

        let report = sched.finalize().unwrap();
        assert!(!report.schedulable);
        assert!(report
            .conflicts
            .iter()
            .any(|c| c.contains("deadline") || c.contains("scheduled")));
    }

    #[test]
    fn test_validate_task_set_is_pure() {
        let specs = vec![
            TaskSpec::new("a", ms(10), ms(2)),
            TaskSpec::new("b", ms(20), ms(3)),
        ];
        let report = TtScheduler::validate_task_set(&specs, ms(1));
        assert!(report.schedulable);
        assert_eq!(report.hyperperiod, ms(20));
        assert_eq!(report.total_instances, 3);
    }

    #[test]
    fn test_builder_assembles_and_finalizes() {
        let ticks = Arc::new(AtomicU64::new(0));
        let t = Arc::clone(&ticks);

        let builder = TaskSetBuilder::new(ms(1))
            .periodic("steady", move || {
                t.fetch_add(1, Ordering::Relaxed);
            }, ms(10), ms(1), 5)
            .critical("guard", || {}, ms(20), ms(1));

        let pre = builder.validate();
        assert!(pre.schedulable);

        let mut sched = TtScheduler::new(ms(1));
        let report = builder.build_into(&mut sched).unwrap();
        assert!(report.schedulable);
        assert_eq!(sched.task_count(), 2);

        sched.run_one_hyperperiod().unwrap();
        assert_eq!(ticks.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_liu_layland_warning_is_advisory() {
        // Three tasks, U = 0.9 > LL bound (~0.78) but still <= 1.
        let specs = vec![
            TaskSpec::new("a", ms(10), ms(3)),
            TaskSpec::new("b", ms(10), ms(3)),
            TaskSpec::new("c", ms(10), ms(3)),
        ];
        let report = TtScheduler::validate_task_set(&specs, ms(1));
        assert!(report.schedulable);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("Liu-Layland")));
    }
}
