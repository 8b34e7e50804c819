//! Discovers the basic blocks and exits of a method body.
//!
//! The builder walks the real instructions once. Every branch target, every instruction following a branch, return
//! or throw, and every exception handler starts a block. Blocks are kept in an arena, with a side table keyed by the
//! identity of their first real instruction, so the same position is never split into two blocks even when several
//! labels are placed there.

use block::*;
use error::*;
use insn::{Insn, InsnId, InsnList, Label, TryCatch};
use offsets::Offsets;

use std::collections::hash_map::{Entry as MapEntry, HashMap};
use std::collections::HashSet;

/// The unresolved control-flow graph of one method.
#[derive(Clone, Debug, Default)]
pub struct Cfg {
    /// The block arena, in discovery order.
    pub blocks: Vec<BasicBlock>,
    /// Exits in program order.
    pub exits: Vec<Exit>,
    /// The catch entry created for each distinct handler label.
    pub catches: Vec<(Label, Target)>,
    /// Maps the first real instruction of each block to the block.
    pub index: HashMap<InsnId, BlockIndex>,
}

impl Cfg {
    /// The block starting at the real instruction `insn`, if any.
    pub fn block_at(&self, insn: InsnId) -> Option<&BasicBlock> {
        self.index.get(&insn).map(|bi| &self.blocks[bi.0])
    }
}

struct Builder<'a> {
    list: &'a InsnList,
    offsets: &'a Offsets,
    cfg: Cfg,
}

/// Builds the blocks and exits of a method.
///
/// # Errors
///
/// * Returns [`EmptyMethod`] if the body has no real instruction.
/// * Returns [`MissingFallThrough`] if a conditional branch is the last instruction.
/// * Returns [`UnplacedLabel`] if a branch or a handler refers to a label with no instruction after it.
/// * Returns [`DuplicateLabel`] if a label is placed more than once.
///
/// [`EmptyMethod`]: ../error/enum.ErrorKind.html#variant.EmptyMethod
/// [`MissingFallThrough`]: ../error/enum.ErrorKind.html#variant.MissingFallThrough
/// [`UnplacedLabel`]: ../error/enum.ErrorKind.html#variant.UnplacedLabel
/// [`DuplicateLabel`]: ../error/enum.ErrorKind.html#variant.DuplicateLabel
pub fn build(list: &InsnList, handlers: &[TryCatch], offsets: &Offsets) -> Result<Cfg> {
    if let Some(label) = list.duplicate_label() {
        bail!(ErrorKind::DuplicateLabel(label));
    }
    let mut builder = Builder {
        list,
        offsets,
        cfg: Cfg::default(),
    };
    builder.scan()?;
    builder.add_catches(handlers)?;
    let cfg = builder.cfg;
    debug!("cfg: {} blocks, {} exits, {} handlers", cfg.blocks.len(), cfg.exits.len(), cfg.catches.len());
    Ok(cfg)
}

impl<'a> Builder<'a> {
    /// The main pass over all real instructions.
    fn scan(&mut self) -> Result<()> {
        let list = self.list;
        let first = list.first().and_then(|id| list.real_at_or_after(id));
        let first = first.ok_or(ErrorKind::EmptyMethod)?;
        self.entry_at(first, EntryReason::MethodEntry);

        let mut split = false;
        let mut cur = Some(first);
        while let Some(id) = cur {
            cur = list.next_real(id);
            if split {
                let start = self.offsets.of(id);
                self.fetch_or_create(id, start);
                split = false;
            }

            let start = self.offset(id);
            let insn = list.get(id);
            let end = start + insn.size() - 1;
            let kind = match *insn {
                Insn::If { target, .. } => {
                    let next = cur.ok_or(ErrorKind::MissingFallThrough(start))?;
                    let fell_into = self.entry_at(next, EntryReason::ConditionalFalse);
                    let jumped = self.entry_at_label(target, EntryReason::ConditionalTrue)?;
                    let exit = Exit {
                        insn: id,
                        start,
                        end: self.offset(next) - 1,
                        kind: ExitKind::Conditional { fell_into, jumped },
                    };
                    trace!("exit {:?}", exit);
                    self.cfg.exits.push(exit);
                    continue;
                },
                Insn::Goto(target) => ExitKind::Goto(self.entry_at_label(target, EntryReason::Goto)?),
                Insn::TableSwitch { min, default, ref labels } => {
                    let default = self.entry_at_label(default, EntryReason::SwitchDefault)?;
                    let mut cases = Vec::with_capacity(labels.len());
                    for (i, &label) in labels.iter().enumerate() {
                        let value = min.wrapping_add(i as i32);
                        cases.push((value, self.entry_at_label(label, EntryReason::SwitchCase(value))?));
                    }
                    ExitKind::Switch { default, cases }
                },
                Insn::LookupSwitch { default, ref keys, ref labels } => {
                    debug_assert_eq!(keys.len(), labels.len());
                    let default = self.entry_at_label(default, EntryReason::SwitchDefault)?;
                    let mut cases = Vec::with_capacity(labels.len());
                    for (&value, &label) in keys.iter().zip(labels) {
                        cases.push((value, self.entry_at_label(label, EntryReason::SwitchCase(value))?));
                    }
                    ExitKind::Switch { default, cases }
                },
                Insn::Return => ExitKind::Simple(SimpleExit::Return),
                Insn::ReturnValue => ExitKind::Simple(SimpleExit::ReturnValue),
                Insn::Throw => ExitKind::Simple(SimpleExit::Throw),
                _ => continue,
            };

            // whatever follows an unconditional transfer can only be reached by a jump.
            split = true;
            let exit = Exit { insn: id, start, end, kind };
            trace!("exit {:?}", exit);
            self.cfg.exits.push(exit);
        }

        Ok(())
    }

    /// Adds one catch entry for each distinct handler label.
    fn add_catches(&mut self, handlers: &[TryCatch]) -> Result<()> {
        let mut seen = HashSet::with_capacity(handlers.len());
        for tc in handlers {
            if !seen.insert(tc.handler) {
                continue;
            }
            let node = self.list.label_node(tc.handler).ok_or(ErrorKind::UnplacedLabel(tc.handler))?;
            let origin = self.list.real_at_or_after(node).ok_or(ErrorKind::UnplacedLabel(tc.handler))?;
            // the start offset of a handler block is left for the resolver.
            let block = self.fetch_or_create(origin, None);
            let entry = self.cfg.blocks[block.0].add_entry(EntryReason::Catch);
            self.cfg.catches.push((tc.handler, Target { block, entry }));
        }
        Ok(())
    }

    /// Offset of a real instruction seen in the main pass.
    fn offset(&self, id: InsnId) -> u32 {
        self.offsets.of(id).unwrap_or_default()
    }

    fn fetch_or_create(&mut self, origin: InsnId, start: Option<u32>) -> BlockIndex {
        let blocks = &mut self.cfg.blocks;
        match self.cfg.index.entry(origin) {
            MapEntry::Occupied(entry) => *entry.get(),
            MapEntry::Vacant(entry) => {
                let bi = BlockIndex(blocks.len());
                trace!("new block {:?} at {:?} (offset {:?})", bi, origin, start);
                blocks.push(BasicBlock::new(origin, start));
                *entry.insert(bi)
            },
        }
    }

    fn entry_at(&mut self, origin: InsnId, reason: EntryReason) -> Target {
        let start = self.offsets.of(origin);
        let block = self.fetch_or_create(origin, start);
        let entry = self.cfg.blocks[block.0].add_entry(reason);
        Target { block, entry }
    }

    fn entry_at_label(&mut self, label: Label, reason: EntryReason) -> Result<Target> {
        let node = self.list.label_node(label).ok_or(ErrorKind::UnplacedLabel(label))?;
        let origin = self.list.real_at_or_after(node).ok_or(ErrorKind::UnplacedLabel(label))?;
        Ok(self.entry_at(origin, reason))
    }
}
