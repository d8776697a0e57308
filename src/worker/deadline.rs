//! Per-job deadline visible to the code running on a worker thread
//!
//! The pool installs the caller's deadline around each job; the write path
//! consults it right before commit.

use std::cell::Cell;
use std::time::Instant;

thread_local! {
    static DEADLINE: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Restores the previous deadline on drop (also on panic)
struct Reset(Option<Instant>);

impl Drop for Reset {
    fn drop(&mut self) {
        DEADLINE.with(|d| d.set(self.0));
    }
}

/// Run `f` with `deadline` installed for the current thread
pub fn scoped<T>(deadline: Instant, f: impl FnOnce() -> T) -> T {
    let previous = DEADLINE.with(|d| d.replace(Some(deadline)));
    let _reset = Reset(previous);
    f()
}

/// Deadline of the job running on this thread, if any
pub fn current() -> Option<Instant> {
    DEADLINE.with(|d| d.get())
}

/// True once the current job's deadline has passed; false outside a job
pub fn expired() -> bool {
    current().is_some_and(|deadline| Instant::now() >= deadline)
}
