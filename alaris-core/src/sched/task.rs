//! Task declarations, schedule entries and per-task metrics

use std::fmt;
use std::time::Duration;

/// Periodic work invoked by the scheduler worker.
pub type TaskFn = Box<dyn FnMut() + Send>;

/// Timing contract of one periodic task.
///
/// Specs are plain data so task sets can be validated without the
/// function handles attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Unique within one scheduler.
    pub name: String,
    /// Activation period; must be a positive multiple of the scheduler's
    /// basic time unit.
    pub period: Duration,
    /// Worst-case execution time supplied by the caller, not measured.
    pub wcet: Duration,
    /// Relative deadline; defaults to the period.
    pub deadline: Duration,
    /// Larger is higher.
    pub priority: i32,
    /// Critical tasks win priority ties in conflict reporting.
    pub is_critical: bool,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, period: Duration, wcet: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            wcet,
            deadline: period,
            priority: 0,
            is_critical: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    /// Fraction of the processor this task demands.
    pub fn utilization(&self) -> f64 {
        self.wcet.as_nanos() as f64 / self.period.as_nanos() as f64
    }
}

/// A task spec paired with its function handle.
pub struct TaskDefinition {
    pub spec: TaskSpec,
    pub function: TaskFn,
}

impl TaskDefinition {
    pub fn new(spec: TaskSpec, function: impl FnMut() + Send + 'static) -> Self {
        Self {
            spec,
            function: Box::new(function),
        }
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// One placed instance in the finalized schedule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledExecution {
    /// Index into the scheduler's task list.
    pub task_id: usize,
    /// Start offset within the hyperperiod; always a BTU multiple.
    pub start_offset: Duration,
    /// `start_offset + wcet`.
    pub end_offset: Duration,
    /// Which activation of the task this is (0-based).
    pub instance: u64,
}

/// Runtime execution statistics for one task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskMetrics {
    pub executions_completed: u64,
    pub deadline_misses: u64,
    pub total_execution_time: Duration,
    pub max_execution_time: Duration,
    pub last_execution_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec = TaskSpec::new("tick", Duration::from_millis(10), Duration::from_millis(2));
        assert_eq!(spec.deadline, spec.period);
        assert_eq!(spec.priority, 0);
        assert!(!spec.is_critical);
        assert!((spec.utilization() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_spec_builders() {
        let spec = TaskSpec::new("hot", Duration::from_millis(10), Duration::from_millis(1))
            .with_priority(50)
            .with_deadline(Duration::from_millis(5))
            .critical();
        assert_eq!(spec.priority, 50);
        assert_eq!(spec.deadline, Duration::from_millis(5));
        assert!(spec.is_critical);
    }
}
