//! Basic blocks, entries and exits.
//!
//! These structures only live while a single method is being instrumented. Blocks are kept in an arena and referred
//! to by [`BlockIndex`]; exits refer to the exact [`Entry`] of the block they transfer control to, so that the
//! branch site can later be retargeted to the instrumentation of that entry.
//!
//! [`BlockIndex`]: ./struct.BlockIndex.html
//! [`Entry`]: ./struct.Entry.html

use insn::{InsnId, Label, Slot};

#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

use std::fmt;
#[cfg(feature = "serde")]
use std::result::Result as StdResult;

//----------------------------------------------------------------------------------------------------------------------
//{{{ BlockIndex & Target

/// Index of a block in the block arena.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockIndex(pub usize);

impl fmt::Debug for BlockIndex {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "BB({})", self.0)
    }
}

/// A forward reference from an exit to one entry of its target block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Target {
    pub block: BlockIndex,
    pub entry: usize,
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Entry

/// The reason control can reach a block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EntryReason {
    MethodEntry,
    /// Reached by running off the end of the previous block, never through a jump.
    FallThrough,
    Catch,
    ConditionalTrue,
    /// The not-taken side of a conditional branch. This side is fallen into.
    ConditionalFalse,
    SwitchCase(i32),
    SwitchDefault,
    Goto,
}

impl EntryReason {
    /// Whether this entry is reached by executing straight into the block, rather than by a jump or a handler. Such
    /// an entry needs no label of its own.
    pub fn is_physical(&self) -> bool {
        match *self {
            EntryReason::MethodEntry | EntryReason::FallThrough | EntryReason::ConditionalFalse => true,
            _ => false,
        }
    }

    /// Short name used in dumps.
    pub fn tag(&self) -> &'static str {
        match *self {
            EntryReason::MethodEntry => "entry",
            EntryReason::FallThrough => "fall",
            EntryReason::Catch => "catch",
            EntryReason::ConditionalTrue => "true",
            EntryReason::ConditionalFalse => "false",
            EntryReason::SwitchCase(_) => "case",
            EntryReason::SwitchDefault => "default",
            EntryReason::Goto => "goto",
        }
    }
}

/// A way into a block.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Entry {
    pub reason: EntryReason,
    /// The synthetic label which branch sites are retargeted to. Assigned when instrumented.
    pub label: Option<Label>,
    /// The counter for this entry. Assigned when instrumented.
    pub slot: Option<Slot>,
}

impl Entry {
    pub fn new(reason: EntryReason) -> Entry {
        Entry {
            reason,
            label: None,
            slot: None,
        }
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Exit

/// The kind of a return/throw-family exit.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SimpleExit {
    Return,
    ReturnValue,
    Throw,
}

/// How an exit transfers control.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ExitKind {
    Simple(SimpleExit),
    Goto(Target),
    /// The fell-into (false) side is always recorded first.
    Conditional { fell_into: Target, jumped: Target },
    Switch { default: Target, cases: Vec<(i32, Target)> },
}

impl ExitKind {
    /// All targets, in order: fell-into before jumped, default before cases.
    pub fn targets(&self) -> Vec<Target> {
        match *self {
            ExitKind::Simple(_) => Vec::new(),
            ExitKind::Goto(target) => vec![target],
            ExitKind::Conditional { fell_into, jumped } => vec![fell_into, jumped],
            ExitKind::Switch { default, ref cases } => {
                let mut targets = Vec::with_capacity(cases.len() + 1);
                targets.push(default);
                targets.extend(cases.iter().map(|&(_, t)| t));
                targets
            },
        }
    }

    /// Short name used in dumps.
    pub fn tag(&self) -> &'static str {
        match *self {
            ExitKind::Simple(SimpleExit::Throw) => "throw",
            ExitKind::Simple(_) => "return",
            ExitKind::Goto(_) => "goto",
            ExitKind::Conditional { .. } => "cond",
            ExitKind::Switch { .. } => "switch",
        }
    }
}

/// The control transfer at the end of a block.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Exit {
    /// The instruction making the transfer.
    pub insn: InsnId,
    pub start: u32,
    pub end: u32,
    pub kind: ExitKind,
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ BasicBlock

bitflags! {
    /// Attributes about a block.
    #[derive(Default)]
    pub struct BlockAttr: u8 {
        /// The block is where the method starts.
        const ENTRY = 1;
        /// The block starts an exception handler.
        const CATCH = 2;
        /// The block ends with a return instruction.
        const RETURN = 4;
        /// The block ends with a throw instruction.
        const THROW = 8;
        /// No path from the method entry or a handler reaches the block.
        const UNREACHABLE = 0x10;
    }
}

#[cfg(feature = "serde")]
impl Serialize for BlockAttr {
    fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

/// A basic block.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BasicBlock {
    /// The first real instruction of the block.
    pub origin: InsnId,
    /// Start offset. `None` until resolved.
    pub start: Option<u32>,
    /// End offset (inclusive). `None` until resolved.
    pub end: Option<u32>,
    pub entries: Vec<Entry>,
    pub exit: Option<Exit>,
    pub attr: BlockAttr,
}

impl BasicBlock {
    pub fn new(origin: InsnId, start: Option<u32>) -> BasicBlock {
        BasicBlock {
            origin,
            start,
            end: None,
            entries: Vec::new(),
            exit: None,
            attr: BlockAttr::empty(),
        }
    }

    /// Adds an entry and returns its index.
    pub fn add_entry(&mut self, reason: EntryReason) -> usize {
        self.entries.push(Entry::new(reason));
        self.entries.len() - 1
    }

    /// The order in which the entries are instrumented: the physical entry (if any) first, then the rest in
    /// discovery order.
    pub fn emission_order(&self) -> Vec<usize> {
        let (mut order, rest): (Vec<usize>, Vec<usize>) =
            (0..self.entries.len()).partition(|&i| self.entries[i].reason.is_physical());
        debug_assert!(order.len() <= 1, "block has {} physical entries", order.len());
        order.extend(rest);
        order
    }
}

//}}}

#[test]
fn test_emission_order_puts_physical_entry_first() {
    let mut list = ::insn::InsnList::new();
    let origin = list.push(::insn::Insn::Return);
    let mut block = BasicBlock::new(origin, Some(0));
    block.add_entry(EntryReason::Goto);
    block.add_entry(EntryReason::SwitchCase(3));
    block.add_entry(EntryReason::FallThrough);
    assert_eq!(block.emission_order(), vec![2, 0, 1]);
}
