//! Resolves block boundaries and folds exits into the blocks containing them.

use block::*;
use builder::Cfg;
use error::*;
use insn::Label;
use offsets::Offsets;

/// A control-flow graph whose blocks partition the method body.
#[derive(Clone, Debug, Default)]
pub struct ResolvedCfg {
    /// The block arena. Indices are the same as in the unresolved [`Cfg`], so exit targets stay valid.
    ///
    /// [`Cfg`]: ../builder/struct.Cfg.html
    pub blocks: Vec<BasicBlock>,
    /// Arena indices sorted by start offset.
    pub order: Vec<BlockIndex>,
    /// `rank[i]` is the position of arena block `i` in `order`.
    pub rank: Vec<usize>,
    /// The catch entry created for each distinct handler label.
    pub catches: Vec<(Label, Target)>,
    pub body_len: u32,
}

impl ResolvedCfg {
    /// Iterates the blocks sorted by start offset.
    pub fn sorted<'a>(&'a self) -> Box<Iterator<Item = &'a BasicBlock> + 'a> {
        Box::new(self.order.iter().map(move |bi| &self.blocks[bi.0]))
    }

    /// Start and end offsets of a resolved block.
    pub fn range(&self, bi: BlockIndex) -> (u32, u32) {
        let block = &self.blocks[bi.0];
        (block.start.unwrap_or_default(), block.end.unwrap_or_default())
    }

    /// Number of exits attached to blocks.
    pub fn exit_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.exit.is_some()).count()
    }
}

/// Sorts the blocks, computes their end offsets and attaches every exit to the block containing it.
///
/// A block without an exit falls through into the next block, which receives a [`FallThrough`] entry.
///
/// # Errors
///
/// * Returns [`UnresolvedBlock`] if the start of a block cannot be determined.
/// * Returns [`DuplicateBlockStart`] if two blocks start at the same offset.
/// * Returns [`DoubleExit`] if a block contains more than one exit.
/// * Returns [`MisplacedExit`] if an exit does not end its block.
/// * Returns [`FallsOffEnd`] if the last block has no exit.
/// * Returns [`UnmatchedExits`] if not every exit was folded into a block.
///
/// [`FallThrough`]: ../block/enum.EntryReason.html#variant.FallThrough
/// [`UnresolvedBlock`]: ../error/enum.ErrorKind.html#variant.UnresolvedBlock
/// [`DuplicateBlockStart`]: ../error/enum.ErrorKind.html#variant.DuplicateBlockStart
/// [`DoubleExit`]: ../error/enum.ErrorKind.html#variant.DoubleExit
/// [`MisplacedExit`]: ../error/enum.ErrorKind.html#variant.MisplacedExit
/// [`FallsOffEnd`]: ../error/enum.ErrorKind.html#variant.FallsOffEnd
/// [`UnmatchedExits`]: ../error/enum.ErrorKind.html#variant.UnmatchedExits
pub fn resolve(cfg: Cfg, offsets: &Offsets) -> Result<ResolvedCfg> {
    let Cfg { mut blocks, exits, catches, .. } = cfg;
    let body_len = offsets.body_len();

    for block in &mut blocks {
        if block.start.is_none() {
            block.start = offsets.of(block.origin);
            trace!("resolved start of block at {:?} = {:?}", block.origin, block.start);
        }
        ensure!(block.start.is_some(), ErrorKind::UnresolvedBlock);
    }

    let mut order = (0..blocks.len()).map(BlockIndex).collect::<Vec<_>>();
    order.sort_by_key(|bi| blocks[bi.0].start);
    let starts = order.iter().map(|bi| blocks[bi.0].start.unwrap_or_default()).collect::<Vec<_>>();
    for pair in starts.windows(2) {
        ensure!(pair[0] != pair[1], ErrorKind::DuplicateBlockStart(pair[0]));
    }

    let expected = exits.len();
    let mut consumed = 0;
    let mut exits = exits.into_iter().peekable();

    for (pos, &bi) in order.iter().enumerate() {
        let start = starts[pos];
        let end = match starts.get(pos + 1) {
            Some(&next_start) => next_start - 1,
            None => body_len - 1,
        };
        blocks[bi.0].end = Some(end);

        loop {
            match exits.peek() {
                Some(exit) if start <= exit.start && exit.start <= end => {},
                _ => break,
            }
            let exit = match exits.next() {
                Some(exit) => exit,
                None => break,
            };
            let block = &mut blocks[bi.0];
            ensure!(block.exit.is_none(), ErrorKind::DoubleExit(start));
            ensure!(exit.end == end, ErrorKind::MisplacedExit(exit.end, end));
            trace!("fold exit {:?} into block @ {}..={}", exit.kind.tag(), start, end);
            block.attr |= match exit.kind {
                ExitKind::Simple(SimpleExit::Throw) => BlockAttr::THROW,
                ExitKind::Simple(_) => BlockAttr::RETURN,
                _ => BlockAttr::empty(),
            };
            block.exit = Some(exit);
            consumed += 1;
        }

        if blocks[bi.0].exit.is_none() {
            match order.get(pos + 1) {
                Some(next) => {
                    blocks[next.0].add_entry(EntryReason::FallThrough);
                },
                None => bail!(ErrorKind::FallsOffEnd(start)),
            }
        }
    }

    ensure!(consumed == expected, ErrorKind::UnmatchedExits(expected, consumed));

    let mut rank = vec![0; blocks.len()];
    for (pos, bi) in order.iter().enumerate() {
        rank[bi.0] = pos;
    }
    for block in &mut blocks {
        for entry in &block.entries {
            block.attr |= match entry.reason {
                EntryReason::MethodEntry => BlockAttr::ENTRY,
                EntryReason::Catch => BlockAttr::CATCH,
                _ => BlockAttr::empty(),
            };
        }
    }

    debug!("resolved {} blocks over {} bytes, {} exits", blocks.len(), body_len, consumed);
    Ok(ResolvedCfg {
        blocks,
        order,
        rank,
        catches,
        body_len,
    })
}

#[cfg(test)]
mod tests {
    use super::{resolve, ResolvedCfg};
    use block::{BlockAttr, EntryReason};
    use builder::{build, Cfg};
    use error::{ErrorKind, Result};
    use insn::{Cond, Insn, Label, Method, Op};
    use offsets::Offsets;

    fn resolve_method(method: &Method) -> Result<ResolvedCfg> {
        let offsets = Offsets::compute(&method.insns);
        let cfg = build(&method.insns, &method.handlers, &offsets)?;
        resolve(cfg, &offsets)
    }

    fn loop_method() -> Method {
        Method::new(
            "loop",
            vec![
                Insn::Op(Op::Const(3)), // 0
                Insn::Op(Op::Store(0)), // 3
                Insn::Label(Label(0)),
                Insn::Op(Op::Load(0)),                         // 5
                Insn::If { cond: Cond::Le, target: Label(1) }, // 7
                Insn::Op(Op::Load(0)),                         // 10
                Insn::Op(Op::Const(1)),                        // 12
                Insn::Op(Op::Sub),                             // 15
                Insn::Op(Op::Store(0)),                        // 16
                Insn::Goto(Label(0)),                          // 18
                Insn::Label(Label(1)),
                Insn::Return, // 21
            ],
        )
    }

    #[test]
    fn test_blocks_partition_body() {
        let cfg = resolve_method(&loop_method()).unwrap();
        let ranges = cfg.order.iter().map(|&bi| cfg.range(bi)).collect::<Vec<_>>();
        assert_eq!(ranges, vec![(0, 4), (5, 9), (10, 20), (21, 21)]);
        assert_eq!(cfg.body_len, 22);
        assert_eq!(cfg.exit_count(), 3);
    }

    #[test]
    fn test_fall_through_entries_are_synthesized() {
        let cfg = resolve_method(&loop_method()).unwrap();
        let entries = cfg.sorted()
            .map(|b| b.entries.iter().map(|e| e.reason).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        assert_eq!(
            entries,
            vec![
                vec![EntryReason::MethodEntry],
                vec![EntryReason::Goto, EntryReason::FallThrough],
                vec![EntryReason::ConditionalFalse],
                vec![EntryReason::ConditionalTrue],
            ]
        );
        let first = cfg.sorted().next().unwrap();
        assert!(first.exit.is_none());
        assert!(first.attr.contains(BlockAttr::ENTRY));
        assert!(cfg.sorted().last().unwrap().attr.contains(BlockAttr::RETURN));
    }

    #[test]
    fn test_catch_block_start_is_resolved() {
        let method = Method::new(
            "catch",
            vec![
                Insn::Label(Label(0)),
                Insn::Op(Op::Invoke(1)), // 0
                Insn::Label(Label(1)),
                Insn::Label(Label(2)),
                Insn::Op(Op::Pop), // 3
                Insn::Return,      // 4
            ],
        ).with_handler(Label(0), Label(1), Label(2));
        let cfg = resolve_method(&method).unwrap();
        let blocks = cfg.sorted().collect::<Vec<_>>();
        assert_eq!(blocks.len(), 2);
        assert_eq!((blocks[1].start, blocks[1].end), (Some(3), Some(4)));
        assert_eq!(
            blocks[1].entries.iter().map(|e| e.reason).collect::<Vec<_>>(),
            vec![EntryReason::Catch, EntryReason::FallThrough]
        );
        assert!(blocks[1].attr.contains(BlockAttr::CATCH));
    }

    #[test]
    fn test_falling_off_the_end_is_rejected() {
        let method = Method::new("open", vec![Insn::Op(Op::Nop), Insn::Op(Op::Nop)]);
        match *resolve_method(&method).unwrap_err().kind() {
            ErrorKind::FallsOffEnd(0) => {},
            ref e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn test_lost_exit_is_detected() {
        let method = loop_method();
        let offsets = Offsets::compute(&method.insns);
        let mut cfg: Cfg = build(&method.insns, &method.handlers, &offsets).unwrap();
        // an exit which no block can contain.
        let mut bogus = cfg.exits[0].clone();
        bogus.start = 1000;
        bogus.end = 1000;
        cfg.exits.push(bogus);
        match *resolve(cfg, &offsets).unwrap_err().kind() {
            ErrorKind::UnmatchedExits(4, 3) => {},
            ref e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn test_two_exits_in_one_block_are_rejected() {
        let method = loop_method();
        let offsets = Offsets::compute(&method.insns);
        let mut cfg = build(&method.insns, &method.handlers, &offsets).unwrap();
        // a second exit in the middle of the block at 10.
        let mut early = cfg.exits[1].clone();
        early.start = 12;
        early.end = 14;
        cfg.exits.insert(1, early);
        match *resolve(cfg, &offsets).unwrap_err().kind() {
            ErrorKind::MisplacedExit(14, 20) | ErrorKind::DoubleExit(10) => {},
            ref e => panic!("unexpected error {:?}", e),
        }
    }
}
