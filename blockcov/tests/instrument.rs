extern crate blockcov;

mod support;

use blockcov::block::EntryReason;
use blockcov::report::MethodCoverage;
use blockcov::{clear_expected_caller, set_expected_caller, Collector, Config, Instrumenter, Snapshot};
use support::{method, Machine, Outcome};

use std::collections::HashSet;

const CHOOSE: &str = "
method choose
        load 0
        ifeq L0
        const 1
        store 1
        goto L1
L0:     const 2
        store 1
L1:     load 1
        vreturn
";

const COUNTDOWN: &str = "
method countdown
        const 0
        store 1
L0:     load 0
        ifle L1
        load 1
        const 1
        add
        store 1
        load 0
        const 1
        sub
        store 0
        goto L0
L1:     load 1
        vreturn
";

const CLASSIFY: &str = "
method classify
        line 7
        load 0
        tableswitch 1 L9 L1 L2 L1
L1:     line 8
        const 10
        vreturn
L2:     line 9
        const 20
        vreturn
L9:     line 10
        const 0
        vreturn
";

const GUARDED: &str = "
method guarded
L0:     load 0
        invoke 1
L1:     const 1
        vreturn
L2:     pop
        const -1
        vreturn
        catch L0 L1 L2
";

fn block_counts(coverage: &MethodCoverage, snapshot: &Snapshot) -> Vec<u64> {
    let mut counts = vec![0; coverage.blocks.len()];
    for e in &coverage.entries {
        counts[e.block] += snapshot.count(e.slot);
    }
    counts
}

fn count_of(coverage: &MethodCoverage, snapshot: &Snapshot, reason: EntryReason) -> u64 {
    coverage.entries.iter().filter(|e| e.reason == reason).map(|e| snapshot.count(e.slot)).sum()
}

#[test]
fn test_if_else_with_shared_return() {
    let collector = Collector::default();
    let mut choose = method(CHOOSE);
    let coverage = Instrumenter::new(&collector).instrument(&mut choose).unwrap();

    assert_eq!(coverage.blocks.len(), 4);
    let return_entries = coverage.entries.iter().filter(|e| e.block == 3).collect::<Vec<_>>();
    let reasons = return_entries.iter().map(|e| e.reason).collect::<HashSet<_>>();
    assert_eq!(reasons, [EntryReason::FallThrough, EntryReason::Goto].iter().cloned().collect());

    let machine = Machine::new(&choose, &collector);
    assert_eq!(machine.run(&[1]), Outcome::Returned(Some(1)));
    let when_true = collector.save_results();
    assert_eq!(machine.run(&[0]), Outcome::Returned(Some(2)));
    let when_false = collector.save_results();

    assert_eq!(block_counts(&coverage, &when_true), vec![1, 1, 0, 1]);
    assert_eq!(block_counts(&coverage, &when_false), vec![1, 0, 1, 1]);
    for snapshot in &[&when_true, &when_false] {
        let taken = coverage
            .entries
            .iter()
            .filter(|e| e.reason == EntryReason::ConditionalTrue || e.reason == EntryReason::ConditionalFalse)
            .filter(|e| snapshot.count(e.slot) > 0)
            .count();
        assert_eq!(taken, 1);
    }

    let mut combined = when_true.clone();
    combined.merge(&when_false);
    assert_eq!(return_entries.iter().map(|e| combined.count(e.slot)).sum::<u64>(), 2);
    assert!(return_entries.iter().all(|e| combined.count(e.slot) == 1));
}

#[test]
fn test_loop_counts_each_pass_once() {
    let collector = Collector::default();
    let mut countdown = method(COUNTDOWN);
    let coverage = Instrumenter::new(&collector).instrument(&mut countdown).unwrap();

    assert_eq!(Machine::new(&countdown, &collector).run(&[5]), Outcome::Returned(Some(5)));
    let snapshot = collector.save_results();
    assert_eq!(block_counts(&coverage, &snapshot), vec![1, 6, 5, 1]);
    assert_eq!(count_of(&coverage, &snapshot, EntryReason::Goto), 5);
    assert_eq!(count_of(&coverage, &snapshot, EntryReason::FallThrough), 1);

    let summary = coverage.summary(&snapshot);
    assert_eq!(summary.blocks_executed, 4);
    assert_eq!(summary.branches_count, 2);
    assert_eq!(summary.branches_taken, 2);
    assert_eq!(summary.entry_count, 1);
}

#[test]
fn test_switch_cases_are_counted_separately() {
    let collector = Collector::default();
    let mut classify = method(CLASSIFY);
    let coverage = Instrumenter::new(&collector).instrument(&mut classify).unwrap();
    let machine = Machine::new(&classify, &collector);

    let results = [1, 2, 3, 7].iter().map(|&x| machine.run(&[x])).collect::<Vec<_>>();
    assert_eq!(
        results,
        vec![
            Outcome::Returned(Some(10)),
            Outcome::Returned(Some(20)),
            Outcome::Returned(Some(10)),
            Outcome::Returned(Some(0)),
        ]
    );

    let snapshot = collector.save_results();
    for e in &coverage.entries {
        let expected = match e.reason {
            EntryReason::MethodEntry => 4,
            _ => 1,
        };
        assert_eq!(snapshot.count(e.slot), expected, "{:?}", e);
    }
    let cases = coverage
        .entries
        .iter()
        .filter_map(|e| match e.reason {
            EntryReason::SwitchCase(v) => Some(v),
            _ => None,
        })
        .collect::<HashSet<_>>();
    assert_eq!(cases, [1, 2, 3].iter().cloned().collect());
    assert_eq!(coverage.blocks.iter().map(|b| b.line).collect::<Vec<_>>(), vec![Some(7), Some(8), Some(9), Some(10)]);
}

#[test]
fn test_exception_handler_entry() {
    let collector = Collector::default();
    let mut guarded = method(GUARDED);
    let coverage = Instrumenter::new(&collector).instrument(&mut guarded).unwrap();
    assert_eq!(guarded.handlers.len(), 1);

    let machine = Machine::new(&guarded, &collector);
    assert_eq!(machine.run(&[5]), Outcome::Returned(Some(1)));
    assert_eq!(machine.run(&[-5]), Outcome::Returned(Some(-1)));
    let snapshot = collector.save_results();
    assert_eq!(count_of(&coverage, &snapshot, EntryReason::MethodEntry), 2);
    assert_eq!(count_of(&coverage, &snapshot, EntryReason::Catch), 1);
}

#[test]
fn test_semantics_are_preserved() {
    let collector = Collector::default();
    for &source in &[CHOOSE, COUNTDOWN, CLASSIFY, GUARDED] {
        let original = method(source);
        let mut instrumented = original.clone();
        Instrumenter::new(&collector).instrument(&mut instrumented).unwrap();
        let before = Machine::new(&original, &collector);
        let after = Machine::new(&instrumented, &collector);
        for x in -3..6 {
            assert_eq!(before.run(&[x]), after.run(&[x]), "{} with {}", original.name, x);
        }
    }
}

#[test]
fn test_blocks_partition_the_body() {
    let collector = Collector::default();
    for &source in &[CHOOSE, COUNTDOWN, CLASSIFY, GUARDED] {
        let mut m = method(source);
        let coverage = Instrumenter::new(&collector).instrument(&mut m).unwrap();
        assert_eq!(coverage.blocks[0].start, 0);
        for pair in coverage.blocks.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        assert_eq!(coverage.blocks.last().unwrap().end, coverage.body_len - 1);

        let mut with_exit = HashSet::new();
        for exit in &coverage.exits {
            assert!(with_exit.insert(exit.block), "{}: two exits in block {}", m.name, exit.block);
            assert_eq!(exit.end, coverage.blocks[exit.block].end);
        }
    }
}

#[test]
fn test_reinstrumenting_allocates_disjoint_slots() {
    let collector = Collector::default();
    let original = method(CLASSIFY);
    let mut first = original.clone();
    let mut second = original.clone();
    let a = Instrumenter::new(&collector).instrument(&mut first).unwrap();
    let b = Instrumenter::new(&collector).instrument(&mut second).unwrap();

    let a = a.slots().collect::<HashSet<_>>();
    let b = b.slots().collect::<HashSet<_>>();
    assert_eq!(a.len(), b.len());
    assert!(a.is_disjoint(&b));
    assert_eq!(collector.last_slot().map(|s| s.0 as usize + 1), Some(a.len() * 2));
}

#[test]
fn test_caller_filter() {
    let collector = Collector::new(Config {
        caller_filter: true,
        ..Config::default()
    });
    let mut choose = method(CHOOSE);
    let coverage = Instrumenter::new(&collector)
        .with_caller_tag(3)
        .instrument(&mut choose)
        .unwrap();
    let machine = Machine::new(&choose, &collector);

    set_expected_caller(4);
    machine.run(&[1]);
    assert_eq!(collector.save_results().total(), 0);

    set_expected_caller(3);
    machine.run(&[1]);
    assert_eq!(count_of(&coverage, &collector.save_results(), EntryReason::MethodEntry), 1);

    clear_expected_caller();
    machine.run(&[1]);
    assert_eq!(collector.save_results().total(), 3);
}
