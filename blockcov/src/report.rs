//! Coverage metadata.
//!
//! Blocks and exits only live while a method is being instrumented. What survives is a [`MethodCoverage`], which maps
//! every slot back to the entry it counts, and which can be combined with a [`Snapshot`] to summarize the coverage of
//! the method. It can be serialized via serde for consumption by external report generators.
//!
//! [`MethodCoverage`]: ./struct.MethodCoverage.html
//! [`Snapshot`]: ../snapshot/struct.Snapshot.html

use block::{BlockAttr, EntryReason};
use insn::Slot;
use offsets::{LineEntry, Offsets};
use resolve::ResolvedCfg;
use snapshot::Snapshot;

/// Coverage metadata of one instrumented method.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MethodCoverage {
    /// Name of the method.
    pub name: String,

    /// Length of the original body in bytes.
    pub body_len: u32,

    /// Blocks in offset order.
    pub blocks: Vec<Block>,

    /// Instrumented entries in slot order.
    pub entries: Vec<EntryRecord>,

    /// Exits in offset order.
    pub exits: Vec<ExitRecord>,

    /// The line-number table of the original body.
    pub lines: Vec<LineEntry>,
}

/// A basic block. All offsets refer to the original body.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Block {
    pub start: u32,
    /// Inclusive.
    pub end: u32,
    pub attr: BlockAttr,
    /// The source line in effect at the start of the block.
    pub line: Option<u32>,
}

/// An instrumented entry.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EntryRecord {
    pub slot: Slot,
    pub reason: EntryReason,
    /// Start offset of the block entered.
    pub start: u32,
    /// End offset (inclusive) of the block entered.
    pub end: u32,
    /// Index of the block entered in [`MethodCoverage::blocks`](struct.MethodCoverage.html#structfield.blocks).
    pub block: usize,
}

/// An exit of a block.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ExitRecord {
    /// One of `"return"`, `"throw"`, `"goto"`, `"cond"` or `"switch"`.
    pub kind: &'static str,
    pub start: u32,
    pub end: u32,
    /// Index of the block ending with this exit.
    pub block: usize,
    /// Indices of the target blocks: the fell-into side before the jumped side, the default before the cases.
    pub targets: Vec<usize>,
    /// The slots counting each target, in the same order.
    pub slots: Vec<Slot>,
}

impl MethodCoverage {
    /// Extracts the metadata of an instrumented graph.
    pub fn new<S: Into<String>>(name: S, cfg: &ResolvedCfg, offsets: &Offsets) -> MethodCoverage {
        let mut coverage = MethodCoverage {
            name: name.into(),
            body_len: cfg.body_len,
            lines: offsets.lines().to_vec(),
            ..MethodCoverage::default()
        };

        for (rank, block) in cfg.sorted().enumerate() {
            let start = block.start.unwrap_or_default();
            let end = block.end.unwrap_or_default();
            coverage.blocks.push(Block {
                start,
                end,
                attr: block.attr,
                line: offsets.line_at(start),
            });
            for entry in &block.entries {
                if let Some(slot) = entry.slot {
                    coverage.entries.push(EntryRecord {
                        slot,
                        reason: entry.reason,
                        start,
                        end,
                        block: rank,
                    });
                }
            }
            if let Some(ref exit) = block.exit {
                let targets = exit.kind.targets();
                coverage.exits.push(ExitRecord {
                    kind: exit.kind.tag(),
                    start: exit.start,
                    end: exit.end,
                    block: rank,
                    targets: targets.iter().map(|t| cfg.rank[t.block.0]).collect(),
                    slots: targets
                        .iter()
                        .filter_map(|t| cfg.blocks[t.block.0].entries[t.entry].slot)
                        .collect(),
                });
            }
        }

        coverage.entries.sort_by_key(|e| e.slot);
        coverage
    }

    /// The slots used by this method.
    pub fn slots<'a>(&'a self) -> Box<Iterator<Item = Slot> + 'a> {
        Box::new(self.entries.iter().map(|e| e.slot))
    }

    /// The entry counted by `slot`.
    pub fn entry(&self, slot: Slot) -> Option<&EntryRecord> {
        self.entries.binary_search_by_key(&slot, |e| e.slot).ok().map(|i| &self.entries[i])
    }

    /// Summarizes the coverage of this method from a snapshot.
    pub fn summary(&self, snapshot: &Snapshot) -> MethodSummary {
        let mut block_counts = vec![0u64; self.blocks.len()];
        for e in &self.entries {
            block_counts[e.block] += snapshot.count(e.slot);
        }
        let entry_count = self.entries
            .iter()
            .filter(|e| e.reason == EntryReason::MethodEntry)
            .map(|e| snapshot.count(e.slot))
            .sum();

        let branching = self.exits.iter().filter(|x| x.kind == "cond" || x.kind == "switch");
        let (branches_count, branches_executed, branches_taken) =
            branching.fold((0, 0, 0), |(count, executed, taken), x| {
                let executed = executed + (block_counts[x.block] > 0) as usize;
                let taken = taken + x.slots.iter().filter(|&&s| snapshot.count(s) > 0).count();
                (count + x.slots.len(), executed, taken)
            });

        MethodSummary {
            blocks_count: self.blocks.len(),
            blocks_executed: block_counts.iter().filter(|&&c| c > 0).count(),
            entries_count: self.entries.len(),
            entries_hit: self.entries.iter().filter(|e| snapshot.count(e.slot) > 0).count(),
            entry_count,
            branches_count,
            branches_executed,
            branches_taken,
        }
    }
}

/// Statistical summary of a method.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MethodSummary {
    /// Number of basic blocks in the method.
    pub blocks_count: usize,

    /// Number of basic blocks that has been executed.
    pub blocks_executed: usize,

    /// Number of instrumented entries.
    pub entries_count: usize,

    /// Number of entries with a non-zero count.
    pub entries_hit: usize,

    /// How many times the method is called.
    pub entry_count: u64,

    /// Number of branch targets of conditional and switch exits.
    pub branches_count: usize,

    /// Number of conditional and switch blocks that has been executed.
    pub branches_executed: usize,

    /// Number of branch targets that has been taken.
    pub branches_taken: usize,
}
