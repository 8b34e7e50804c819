//! Offsets of instructions inside a method body.

use insn::{Insn, InsnId, InsnList, Label};

use std::collections::HashMap;

/// A row of the line-number table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct LineEntry {
    pub offset: u32,
    pub line: u32,
}

/// Positions of every node in an [`InsnList`], as if it were encoded right now.
///
/// Real instructions are laid out back to back. A pseudo instruction takes the offset of the real instruction that
/// follows it, or the body length if none does.
///
/// [`InsnList`]: ../insn/struct.InsnList.html
#[derive(Clone, Debug, Default)]
pub struct Offsets {
    real: HashMap<InsnId, u32>,
    labels: HashMap<Label, u32>,
    lines: Vec<LineEntry>,
    body_len: u32,
}

impl Offsets {
    /// Assigns offsets to all nodes of the list.
    pub fn compute(list: &InsnList) -> Offsets {
        let mut offsets = Offsets::default();
        let mut pending_labels = Vec::new();
        let mut pending_lines = Vec::new();
        let mut pc = 0;

        for (id, insn) in list.iter() {
            match *insn {
                Insn::Label(label) => pending_labels.push(label),
                Insn::Line(line) => pending_lines.push(line),
                _ => {
                    trace!("offset {:?} @ {}: {:?}", id, pc, insn);
                    offsets.flush(&mut pending_labels, &mut pending_lines, pc);
                    offsets.real.insert(id, pc);
                    pc += insn.size();
                },
            }
        }
        offsets.flush(&mut pending_labels, &mut pending_lines, pc);
        offsets.body_len = pc;
        offsets
    }

    fn flush(&mut self, labels: &mut Vec<Label>, lines: &mut Vec<u32>, pc: u32) {
        for label in labels.drain(..) {
            self.labels.insert(label, pc);
        }
        for line in lines.drain(..) {
            self.lines.push(LineEntry { offset: pc, line });
        }
    }

    /// Offset of a real instruction. Returns `None` for pseudo instructions and foreign nodes.
    pub fn of(&self, id: InsnId) -> Option<u32> {
        self.real.get(&id).cloned()
    }

    /// Offset of a placed label.
    pub fn label(&self, label: Label) -> Option<u32> {
        self.labels.get(&label).cloned()
    }

    /// Total encoded length of the body.
    pub fn body_len(&self) -> u32 {
        self.body_len
    }

    /// The line-number table in list order.
    pub fn lines(&self) -> &[LineEntry] {
        &self.lines
    }

    /// The source line in effect at `offset`, i.e. the last line marker placed at or before it.
    pub fn line_at(&self, offset: u32) -> Option<u32> {
        self.lines.iter().filter(|e| e.offset <= offset).last().map(|e| e.line)
    }
}

#[cfg(test)]
mod tests {
    use super::{LineEntry, Offsets};
    use insn::{Cond, Insn, InsnList, Label, Op};

    #[test]
    fn test_pseudo_instructions_take_next_offset() {
        let list: InsnList = vec![
            Insn::Line(10),
            Insn::Op(Op::Load(0)),
            Insn::If { cond: Cond::Eq, target: Label(0) },
            Insn::Line(11),
            Insn::Op(Op::Nop),
            Insn::Label(Label(0)),
            Insn::Line(12),
            Insn::Return,
            Insn::Label(Label(1)),
        ].into_iter()
            .collect();
        let offsets = Offsets::compute(&list);

        let ids = list.iter().map(|(id, _)| id).collect::<Vec<_>>();
        assert_eq!(offsets.of(ids[0]), None);
        assert_eq!(offsets.of(ids[1]), Some(0));
        assert_eq!(offsets.of(ids[2]), Some(2));
        assert_eq!(offsets.of(ids[4]), Some(5));
        assert_eq!(offsets.of(ids[7]), Some(6));
        assert_eq!(offsets.label(Label(0)), Some(6));
        assert_eq!(offsets.label(Label(1)), Some(7));
        assert_eq!(offsets.body_len(), 7);
        assert_eq!(
            offsets.lines(),
            &[
                LineEntry { offset: 0, line: 10 },
                LineEntry { offset: 5, line: 11 },
                LineEntry { offset: 6, line: 12 },
            ]
        );
        assert_eq!(offsets.line_at(3), Some(10));
        assert_eq!(offsets.line_at(6), Some(12));
    }
}
