// ABOUTME: Host-derived defaults for worker pool sizing
// ABOUTME: Baseline concurrency from CPU parallelism, queue bound from available memory

use std::num::NonZeroUsize;
use sysinfo::System;

/// Memory assumed to be held by one queued task (pessimistic)
pub const DEFAULT_TASK_MEMORY_BUDGET: u64 = 4 * 1024 * 1024;

/// Ceiling of elastic workers as a multiple of the baseline
pub const DEFAULT_MAX_WORKERS_MULTIPLIER: usize = 32;

/// Baseline worker count: one per hardware thread
pub fn default_min_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Bytes of memory currently available to new allocations
pub fn available_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

/// How many tasks fit in `available` bytes at `budget` bytes each,
/// capped to the `u32` range
pub fn max_queued_tasks(available: u64, budget: u64) -> usize {
    let tasks = available / budget.max(1);
    tasks.min(u64::from(u32::MAX)) as usize
}

/// Queue bound for the current host using the default per-task budget
pub fn default_max_queued_tasks() -> usize {
    max_queued_tasks(available_memory(), DEFAULT_TASK_MEMORY_BUDGET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_min_workers_is_positive() {
        assert!(default_min_workers() >= 1);
    }

    #[test]
    fn test_max_queued_tasks_divides_by_budget() {
        let budget = DEFAULT_TASK_MEMORY_BUDGET;
        assert_eq!(max_queued_tasks(budget * 10, budget), 10);
        assert_eq!(max_queued_tasks(budget - 1, budget), 0);
    }

    #[test]
    fn test_max_queued_tasks_is_capped() {
        assert_eq!(max_queued_tasks(u64::MAX, 1), u32::MAX as usize);
    }

    #[test]
    fn test_zero_budget_does_not_divide_by_zero() {
        assert_eq!(max_queued_tasks(100, 0), 100);
    }
}
