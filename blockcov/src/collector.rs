//! The runtime counter store.
//!
//! Instrumented code calls [`hit`] with the slot assigned to the entry it just passed through. The counters live in
//! one array behind an [`ArcSwap`] handle, so a hit is a wait-free load of the handle followed by a relaxed
//! `fetch_add`. Growing the array and saving results both replace the handle; a hit racing with either may land in
//! the array being replaced and be lost. Nothing else can lose a hit.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --new_slot--> Enabled <--enable/disable--> Disabled
//! ```
//!
//! [`hit`]: ./fn.hit.html
//! [`ArcSwap`]: https://docs.rs/arc-swap/1/arc_swap/type.ArcSwap.html

use config::Config;
use error::*;
use guard::{self, ReentryGuard};
use insert::SlotAllocator;
use insn::Slot;
use snapshot::{ResultSink, Snapshot};

use arc_swap::ArcSwap;

use std::cmp::{max, min};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

const UNINITIALIZED: usize = 0;
const ENABLED: usize = 1;
const DISABLED: usize = 2;

//----------------------------------------------------------------------------------------------------------------------
//{{{ Counters

#[derive(Debug)]
struct Counters(Box<[AtomicU64]>);

impl Counters {
    fn zeroed(len: usize) -> Counters {
        Counters((0..len).map(|_| AtomicU64::new(0)).collect::<Vec<_>>().into_boxed_slice())
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn read(&self, len: usize) -> Vec<u64> {
        self.0[..min(len, self.len())].iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Collector

/// A growable array of hit counters.
pub struct Collector {
    live: ArcSwap<Counters>,
    /// Number of slots handed out.
    assigned: AtomicUsize,
    state: AtomicUsize,
    grow_lock: Mutex<()>,
    /// Also serializes saves.
    sink: Mutex<Option<Box<ResultSink>>>,
    config: Config,
}

impl Collector {
    /// Creates a collector. The sink described by the configuration is installed.
    pub fn new(config: Config) -> Collector {
        let capacity = max(config.initial_capacity, 1);
        Collector {
            live: ArcSwap::from_pointee(Counters::zeroed(capacity)),
            assigned: AtomicUsize::new(0),
            state: AtomicUsize::new(UNINITIALIZED),
            grow_lock: Mutex::new(()),
            sink: Mutex::new(config.sink()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the sink receiving saved snapshots, returning the previous one.
    pub fn set_sink(&self, sink: Box<ResultSink>) -> Option<Box<ResultSink>> {
        lock(&self.sink).replace(sink)
    }

    /// Allocates a new slot, growing the counter array if needed. The first allocation enables the collector.
    pub fn new_slot(&self) -> Slot {
        let index = self.assigned.fetch_add(1, Ordering::SeqCst);
        self.ensure_capacity(index + 1);
        if self.state.compare_exchange(UNINITIALIZED, ENABLED, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            debug!("collector enabled by the first slot");
        }
        Slot(index as u32)
    }

    /// The last slot handed out, if any.
    pub fn last_slot(&self) -> Option<Slot> {
        match self.assigned.load(Ordering::SeqCst) {
            0 => None,
            n => Some(Slot(n as u32 - 1)),
        }
    }

    /// Current capacity of the counter array.
    pub fn capacity(&self) -> usize {
        self.live.load().len()
    }

    fn ensure_capacity(&self, len: usize) {
        if self.live.load().len() >= len {
            return;
        }
        let _grow = lock(&self.grow_lock);
        let old = self.live.load_full();
        if old.len() >= len {
            return;
        }
        let new_len = max(old.len() * 2, len);
        trace!("growing counters {} -> {}", old.len(), new_len);
        let new = Counters::zeroed(new_len);
        for (dest, src) in new.0.iter().zip(old.0.iter()) {
            dest.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        self.live.store(Arc::new(new));
    }

    /// Records one execution of the entry assigned `slot`.
    ///
    /// Ignored unless the collector is enabled, or while the current thread runs instrumentation-support code. A slot
    /// beyond the array visible to this thread is ignored too.
    pub fn hit(&self, slot: Slot) {
        if self.state.load(Ordering::Relaxed) != ENABLED || guard::is_reentrant() {
            return;
        }
        if let Some(counter) = self.live.load().0.get(usize::from(slot)) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Like [`hit`](#method.hit), but when the caller filter is configured, the hit only counts if `tag` is the
    /// expected caller of the current thread.
    pub fn hit_tagged(&self, slot: Slot, tag: u32) {
        if self.config.caller_filter && !guard::caller_matches(tag) {
            return;
        }
        self.hit(slot);
    }

    /// The counts of all assigned slots.
    pub fn counts(&self) -> Vec<u64> {
        self.live.load().read(self.assigned.load(Ordering::SeqCst))
    }

    /// The count of one slot. Unassigned slots count as zero.
    pub fn count_for(&self, slot: Slot) -> u64 {
        match self.live.load().0.get(usize::from(slot)) {
            Some(counter) => counter.load(Ordering::Relaxed),
            None => 0,
        }
    }

    /// Overwrites the count of one slot. Does nothing for a slot beyond the array.
    pub fn set_count_for(&self, slot: Slot, value: u64) {
        if let Some(counter) = self.live.load().0.get(usize::from(slot)) {
            counter.store(value, Ordering::Relaxed);
        }
    }

    /// Resumes counting.
    pub fn enable(&self) {
        self.state.store(ENABLED, Ordering::SeqCst);
    }

    /// Stops counting. Hits are dropped until the next [`enable`](#method.enable).
    pub fn disable(&self) {
        self.state.store(DISABLED, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == ENABLED
    }

    /// Swaps the live counters for a zeroed array of the same size, and hands the old counts to the sink.
    ///
    /// Never fails: persistence errors are retried as configured, logged, then dropped. Returns the snapshot taken.
    pub fn save_results(&self) -> Snapshot {
        let _guard = ReentryGuard::enter();
        let mut sink = lock(&self.sink);

        let old = {
            let _grow = lock(&self.grow_lock);
            let len = self.live.load().len();
            self.live.swap(Arc::new(Counters::zeroed(len)))
        };
        let snapshot = Snapshot::new(old.read(self.assigned.load(Ordering::SeqCst)));
        debug!("saving {} slots, {} hits", snapshot.len(), snapshot.total());

        if let Some(ref mut sink) = *sink {
            if let Err(e) = self.persist(&mut **sink, &snapshot) {
                warn!("{}", e);
            }
        }
        snapshot
    }

    fn persist(&self, sink: &mut ResultSink, snapshot: &Snapshot) -> Result<()> {
        let attempts = max(self.config.save_attempts, 1);
        for attempt in 1..(attempts + 1) {
            match sink.persist(snapshot) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("attempt {} of {} to save coverage results failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        thread::sleep(self.config.retry_delay());
                    }
                },
            }
        }
        Err(ErrorKind::SaveFailed(attempts).into())
    }
}

impl Default for Collector {
    fn default() -> Collector {
        Collector::new(Config::default())
    }
}

impl SlotAllocator for Collector {
    fn new_slot(&self) -> Slot {
        Collector::new_slot(self)
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Process-wide collector

lazy_static! {
    static ref GLOBAL: Collector = Collector::new(Config::from_env());
}

/// The process-wide collector, configured from the environment on first use.
pub fn global() -> &'static Collector {
    &GLOBAL
}

/// Records a hit on the process-wide collector.
pub fn hit(slot: Slot) {
    GLOBAL.hit(slot);
}

/// Records a tagged hit on the process-wide collector.
pub fn hit_tagged(slot: Slot, tag: u32) {
    GLOBAL.hit_tagged(slot, tag);
}

/// Allocates a slot on the process-wide collector.
pub fn new_slot() -> Slot {
    GLOBAL.new_slot()
}

pub fn enable() {
    GLOBAL.enable();
}

pub fn disable() {
    GLOBAL.disable();
}

/// Saves the results of the process-wide collector.
pub fn save_results() -> Snapshot {
    GLOBAL.save_results()
}

//}}}

#[cfg(test)]
mod tests {
    use super::Collector;
    use config::Config;
    use error::*;
    use insn::Slot;
    use snapshot::{MemorySink, ResultSink, Snapshot};

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small() -> Collector {
        Collector::new(Config {
            initial_capacity: 2,
            retry_delay_ms: 0,
            ..Config::default()
        })
    }

    #[test]
    fn test_hits_before_first_slot_are_ignored() {
        let collector = small();
        collector.hit(Slot(0));
        assert!(!collector.is_enabled());
        let slot = collector.new_slot();
        assert!(collector.is_enabled());
        collector.hit(slot);
        assert_eq!(collector.count_for(slot), 1);
    }

    #[test]
    fn test_growth_keeps_counts() {
        let collector = small();
        let slots = (0..5).map(|_| collector.new_slot()).collect::<Vec<_>>();
        assert_eq!(slots, (0..5).map(Slot).collect::<Vec<_>>());
        assert_eq!(collector.capacity(), 8);
        collector.hit(Slot(1));
        collector.hit(Slot(4));
        collector.hit(Slot(4));
        collector.hit(Slot(100));
        assert_eq!(collector.counts(), vec![0, 1, 0, 0, 2]);
        assert_eq!(collector.last_slot(), Some(Slot(4)));
    }

    #[test]
    fn test_disable_and_set_count() {
        let collector = small();
        let slot = collector.new_slot();
        collector.disable();
        collector.hit(slot);
        assert_eq!(collector.count_for(slot), 0);
        collector.enable();
        collector.set_count_for(slot, 41);
        collector.hit(slot);
        assert_eq!(collector.count_for(slot), 42);
    }

    #[test]
    fn test_save_resets_and_persists() {
        let collector = small();
        let sink = MemorySink::new();
        let saved = sink.handle();
        collector.set_sink(Box::new(sink));
        let slot = collector.new_slot();
        collector.hit(slot);
        collector.hit(slot);

        let snapshot = collector.save_results();
        assert_eq!(snapshot.counts(), &[2]);
        assert_eq!(collector.count_for(slot), 0);
        assert_eq!(saved.lock().unwrap().clone(), vec![snapshot]);
    }

    struct FlakySink {
        calls: Arc<AtomicUsize>,
        failures: usize,
    }

    impl ResultSink for FlakySink {
        fn persist(&mut self, _: &Snapshot) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            ensure!(call >= self.failures, ErrorKind::BadSnapshot("sink unavailable"));
            Ok(())
        }
    }

    #[test]
    fn test_save_retries_then_gives_up() {
        let collector = small();
        let calls = Arc::new(AtomicUsize::new(0));
        collector.set_sink(Box::new(FlakySink {
            calls: calls.clone(),
            failures: 2,
        }));
        collector.save_results();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        calls.store(0, Ordering::SeqCst);
        collector.set_sink(Box::new(FlakySink {
            calls: calls.clone(),
            failures: 10,
        }));
        collector.save_results();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
