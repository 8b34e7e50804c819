//! Thread-local state of the collector: the re-entrancy depth and the expected caller tag.
//!
//! Instrumentation-support code (the instrumenter itself, and the save path of the collector) enters a
//! [`ReentryGuard`] while it runs. A hit recorded while the current thread holds a guard is ignored, so the machinery
//! never counts its own execution.
//!
//! [`ReentryGuard`]: ./struct.ReentryGuard.html

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static DEPTH: Cell<u32> = Cell::new(0);
    static EXPECTED_CALLER: Cell<Option<u32>> = Cell::new(None);
}

/// Marks the current thread as running instrumentation-support code until dropped. Guards nest.
#[derive(Debug)]
pub struct ReentryGuard {
    // the guard must be dropped on the thread which entered it.
    _not_send: PhantomData<*const ()>,
}

impl ReentryGuard {
    /// Increments the depth of the current thread.
    pub fn enter() -> ReentryGuard {
        let _ = DEPTH.try_with(|d| d.set(d.get() + 1));
        ReentryGuard { _not_send: PhantomData }
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        let _ = DEPTH.try_with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// The current nesting depth of [`ReentryGuard`]s on this thread.
///
/// [`ReentryGuard`]: ./struct.ReentryGuard.html
pub fn depth() -> u32 {
    DEPTH.try_with(Cell::get).unwrap_or(0)
}

/// Whether the current thread is inside instrumentation-support code. A thread being torn down is always considered
/// re-entrant, since its thread-local state is no longer trustworthy.
pub fn is_reentrant() -> bool {
    DEPTH.try_with(|d| d.get() != 0).unwrap_or(true)
}

/// Restricts tagged hits on the current thread to those carrying `tag`.
pub fn set_expected_caller(tag: u32) {
    let _ = EXPECTED_CALLER.try_with(|c| c.set(Some(tag)));
}

/// Lifts the restriction set by [`set_expected_caller`].
///
/// [`set_expected_caller`]: ./fn.set_expected_caller.html
pub fn clear_expected_caller() {
    let _ = EXPECTED_CALLER.try_with(|c| c.set(None));
}

/// The tag set by [`set_expected_caller`] on this thread.
///
/// [`set_expected_caller`]: ./fn.set_expected_caller.html
pub fn expected_caller() -> Option<u32> {
    EXPECTED_CALLER.try_with(Cell::get).unwrap_or(None)
}

/// Whether a hit tagged `tag` passes the caller filter of the current thread. Everything passes when no caller is
/// expected.
pub fn caller_matches(tag: u32) -> bool {
    match expected_caller() {
        Some(expected) => expected == tag,
        None => true,
    }
}

#[test]
fn test_guards_nest() {
    assert!(!is_reentrant());
    {
        let _outer = ReentryGuard::enter();
        {
            let _inner = ReentryGuard::enter();
            assert_eq!(depth(), 2);
        }
        assert_eq!(depth(), 1);
        assert!(is_reentrant());
    }
    assert_eq!(depth(), 0);
}

#[test]
fn test_caller_filter_is_per_thread() {
    set_expected_caller(7);
    assert!(caller_matches(7));
    assert!(!caller_matches(8));
    let other = ::std::thread::spawn(|| caller_matches(8)).join().unwrap();
    assert!(other);
    clear_expected_caller();
    assert!(caller_matches(8));
}
