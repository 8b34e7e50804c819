//! Inserts the counter increments.
//!
//! Every block with entries is given the "jump-over" layout right before its first real instruction:
//!
//! ```text
//!         hit(s0)        ; physical entry, no label
//!         goto BODY
//! L1:     hit(s1)
//!         goto BODY
//! L2:     hit(s2)        ; last entry, no jump
//! BODY:   <original code>
//! ```
//!
//! Each branch site which created a labelled entry is then retargeted to that entry's label, so every path into the
//! block executes exactly one increment.

use block::*;
use error::*;
use insn::{Insn, InsnId, InsnList, Label, Slot, TryCatch};
use resolve::ResolvedCfg;

/// Source of fresh counter slots.
pub trait SlotAllocator {
    /// Allocates a slot never returned before.
    fn new_slot(&self) -> Slot;
}

/// How a branch instruction should be rewritten.
enum Retarget {
    Jump(Label),
    Switch { default: Label, cases: Vec<Label> },
}

/// Instruments every block of the resolved graph in place.
///
/// Assigns a slot to each entry (and a label to each non-physical entry), inserts the increments and retargets the
/// branch sites and the handler table. `tag`, if given, makes every inserted increment subject to the caller filter.
///
/// # Errors
///
/// Returns [`MissingEntryLabel`] if a branch site targets an entry which did not receive a label.
///
/// [`MissingEntryLabel`]: ../error/enum.ErrorKind.html#variant.MissingEntryLabel
pub fn insert(
    list: &mut InsnList,
    handlers: &mut [TryCatch],
    cfg: &mut ResolvedCfg,
    alloc: &SlotAllocator,
    tag: Option<u32>,
) -> Result<()> {
    for pos in 0..cfg.order.len() {
        let bi = cfg.order[pos];
        emit_block(list, &mut cfg.blocks[bi.0], alloc, tag);
    }

    let mut retargets = Vec::new();
    for block in &cfg.blocks {
        let exit = match block.exit {
            Some(ref exit) => exit,
            None => continue,
        };
        let label_of = |target: &Target| -> Result<Label> {
            let entry = &cfg.blocks[target.block.0].entries[target.entry];
            entry.label.ok_or_else(|| ErrorKind::MissingEntryLabel(exit.start).into())
        };
        let retarget = match exit.kind {
            ExitKind::Simple(_) => continue,
            ExitKind::Goto(ref target) | ExitKind::Conditional { jumped: ref target, .. } => {
                Retarget::Jump(label_of(target)?)
            },
            ExitKind::Switch { ref default, ref cases } => Retarget::Switch {
                default: label_of(default)?,
                cases: cases.iter().map(|&(_, ref t)| label_of(t)).collect::<Result<_>>()?,
            },
        };
        retargets.push((exit.insn, retarget));
    }
    for (id, retarget) in retargets {
        apply(list.get_mut(id), retarget, id);
    }

    for &(handler, target) in &cfg.catches {
        let block = &cfg.blocks[target.block.0];
        let label = block.entries[target.entry].label;
        let label = label.ok_or_else(|| ErrorKind::MissingEntryLabel(block.start.unwrap_or_default()))?;
        for tc in handlers.iter_mut().filter(|tc| tc.handler == handler) {
            trace!("retarget handler {:?} -> {:?}", handler, label);
            tc.handler = label;
        }
    }

    Ok(())
}

/// Lays out the increments of one block.
fn emit_block(list: &mut InsnList, block: &mut BasicBlock, alloc: &SlotAllocator, tag: Option<u32>) {
    let order = block.emission_order();
    if order.is_empty() {
        return;
    }

    for &i in &order {
        let entry = &mut block.entries[i];
        entry.slot = Some(alloc.new_slot());
        if !entry.reason.is_physical() {
            entry.label = Some(list.new_label());
        }
    }
    let body = if order.len() > 1 {
        Some(list.new_label())
    } else {
        None
    };

    let origin = block.origin;
    for (n, &i) in order.iter().enumerate() {
        let entry = &block.entries[i];
        if let Some(label) = entry.label {
            list.insert_before(origin, Insn::Label(label));
        }
        if let Some(slot) = entry.slot {
            list.insert_before(origin, Insn::Hit { slot, tag });
        }
        match body {
            Some(body) if n + 1 < order.len() => {
                list.insert_before(origin, Insn::Goto(body));
            },
            _ => {},
        }
        trace!("entry {:?} of block @ {:?} -> {:?} {:?}", entry.reason, block.start, entry.slot, entry.label);
    }
    if let Some(body) = body {
        list.insert_before(origin, Insn::Label(body));
    }
}

fn apply(insn: &mut Insn, retarget: Retarget, id: InsnId) {
    match retarget {
        Retarget::Jump(label) => match *insn {
            Insn::If { ref mut target, .. } | Insn::Goto(ref mut target) => {
                trace!("retarget {:?}: {:?} -> {:?}", id, target, label);
                *target = label;
            },
            _ => debug_assert!(false, "exit {:?} is not a jump", id),
        },
        Retarget::Switch { default: new_default, cases } => match *insn {
            Insn::TableSwitch { ref mut default, ref mut labels, .. }
            | Insn::LookupSwitch { ref mut default, ref mut labels, .. } => {
                debug_assert_eq!(labels.len(), cases.len());
                trace!("retarget switch {:?}: default {:?} -> {:?}", id, default, new_default);
                *default = new_default;
                *labels = cases;
            },
            _ => debug_assert!(false, "exit {:?} is not a switch", id),
        },
    }
}
