//! The instruction model shared with the bytecode reader/writer.
//!
//! The reader/writer itself is outside of this crate. It hands over each method as an [`InsnList`], which is an
//! arena-backed doubly linked list: every node keeps a stable [`InsnId`] for its whole life, so inserting new
//! instructions anywhere never invalidates other positions that the instrumentation pass is still holding.
//!
//! [`InsnList`]: ./struct.InsnList.html
//! [`InsnId`]: ./struct.InsnId.html

use std::cmp::max;
use std::collections::hash_map::{Entry as MapEntry, HashMap};
use std::fmt;
use std::iter::FromIterator;

//----------------------------------------------------------------------------------------------------------------------
//{{{ Label, InsnId & Slot

/// A jump target. A label is "placed" when an [`Insn::Label`] node carrying it is inserted into the list.
///
/// [`Insn::Label`]: ./enum.Insn.html#variant.Label
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Label(pub u32);

impl fmt::Debug for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "L{}", self.0)
    }
}

/// Identity of a node in an [`InsnList`].
///
/// [`InsnList`]: ./struct.InsnList.html
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InsnId(usize);

impl fmt::Debug for InsnId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "#{}", self.0)
    }
}

/// Index of one counter in the runtime counter store.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Slot(pub u32);

impl fmt::Debug for Slot {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Slot({})", self.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(fmt)
    }
}

impl From<Slot> for usize {
    fn from(slot: Slot) -> usize {
        slot.0 as usize
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Insn

/// Condition of an [`Insn::If`]. The popped operand is compared against zero.
///
/// [`Insn::If`]: ./enum.Insn.html#variant.If
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cond {
    /// Whether the branch is taken for the operand `value`.
    pub fn test(self, value: i64) -> bool {
        match self {
            Cond::Eq => value == 0,
            Cond::Ne => value != 0,
            Cond::Lt => value < 0,
            Cond::Ge => value >= 0,
            Cond::Gt => value > 0,
            Cond::Le => value <= 0,
        }
    }
}

/// Straight-line operations, which never transfer control.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Op {
    Nop,
    Const(i64),
    Load(u16),
    Store(u16),
    Add,
    Sub,
    Dup,
    Pop,
    /// Calls another method by index. Control returns to the next instruction.
    Invoke(u32),
}

impl Op {
    fn size(&self) -> u32 {
        match *self {
            Op::Nop | Op::Add | Op::Sub | Op::Dup | Op::Pop => 1,
            Op::Load(_) | Op::Store(_) => 2,
            Op::Const(_) | Op::Invoke(_) => 3,
        }
    }
}

/// An instruction node.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Insn {
    /// Places a label. Pseudo instruction.
    Label(Label),
    /// Marks the start of a source line. Pseudo instruction.
    Line(u32),
    Op(Op),
    If { cond: Cond, target: Label },
    Goto(Label),
    TableSwitch { min: i32, default: Label, labels: Vec<Label> },
    LookupSwitch { default: Label, keys: Vec<i32>, labels: Vec<Label> },
    Return,
    ReturnValue,
    Throw,
    /// Increments the counter `slot`. With a `tag`, the increment is subject to the caller filter.
    Hit { slot: Slot, tag: Option<u32> },
}

impl Insn {
    /// Whether this instruction occupies space in the encoded body. Labels and line markers do not.
    pub fn is_real(&self) -> bool {
        match *self {
            Insn::Label(_) | Insn::Line(_) => false,
            _ => true,
        }
    }

    /// Encoded size of this instruction in bytes.
    pub fn size(&self) -> u32 {
        match *self {
            Insn::Label(_) | Insn::Line(_) => 0,
            Insn::Op(ref op) => op.size(),
            Insn::If { .. } | Insn::Goto(_) => 3,
            Insn::TableSwitch { ref labels, .. } => 13 + 4 * labels.len() as u32,
            Insn::LookupSwitch { ref labels, .. } => 9 + 8 * labels.len() as u32,
            Insn::Return | Insn::ReturnValue | Insn::Throw => 1,
            Insn::Hit { tag: None, .. } => 6,
            Insn::Hit { tag: Some(_), .. } => 9,
        }
    }

    /// Every label this instruction places or refers to.
    fn labels(&self) -> Vec<Label> {
        match *self {
            Insn::Label(l) | Insn::Goto(l) | Insn::If { target: l, .. } => vec![l],
            Insn::TableSwitch { default, ref labels, .. } | Insn::LookupSwitch { default, ref labels, .. } => {
                let mut all = labels.clone();
                all.push(default);
                all
            },
            _ => Vec::new(),
        }
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ InsnList

#[derive(Clone, Debug)]
struct Node {
    insn: Insn,
    prev: Option<InsnId>,
    next: Option<InsnId>,
}

/// A mutable instruction list with stable node identities.
#[derive(Clone, Debug, Default)]
pub struct InsnList {
    nodes: Vec<Node>,
    head: Option<InsnId>,
    tail: Option<InsnId>,
    placed: HashMap<Label, InsnId>,
    /// Labels placed again after their first placement, which stays in effect.
    duplicates: Vec<Label>,
    live: usize,
    next_label: u32,
}

impl InsnList {
    /// Creates an empty list.
    pub fn new() -> InsnList {
        InsnList::default()
    }

    /// Number of linked nodes, including pseudo instructions.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no node is linked.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Whether `label` is placed in the list.
    pub fn is_placed(&self, label: Label) -> bool {
        self.placed.contains_key(&label)
    }

    /// The first label placed more than once, if any.
    pub fn duplicate_label(&self) -> Option<Label> {
        self.duplicates.first().cloned()
    }

    /// Allocates a label which is not used anywhere in this list yet.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Appends an instruction to the end of the list.
    pub fn push(&mut self, insn: Insn) -> InsnId {
        let id = self.alloc(insn, self.tail, None);
        match self.tail {
            Some(tail) => self.nodes[tail.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    /// Inserts an instruction immediately before the node `at`.
    pub fn insert_before(&mut self, at: InsnId, insn: Insn) -> InsnId {
        let prev = self.nodes[at.0].prev;
        let id = self.alloc(insn, prev, Some(at));
        match prev {
            Some(prev) => self.nodes[prev.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.nodes[at.0].prev = Some(id);
        id
    }

    /// Inserts an instruction immediately after the node `at`.
    pub fn insert_after(&mut self, at: InsnId, insn: Insn) -> InsnId {
        let next = self.nodes[at.0].next;
        let id = self.alloc(insn, Some(at), next);
        match next {
            Some(next) => self.nodes[next.0].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.nodes[at.0].next = Some(id);
        id
    }

    /// Unlinks the node `id` from the list. The identity is never reused. Removing a node twice does nothing.
    pub fn remove(&mut self, id: InsnId) {
        if self.nodes[id.0].prev.is_none() && self.head != Some(id) {
            return;
        }
        self.live -= 1;
        let (prev, next) = {
            let node = &mut self.nodes[id.0];
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(prev) => self.nodes[prev.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next.0].prev = prev,
            None => self.tail = prev,
        }
        if let Insn::Label(label) = self.nodes[id.0].insn {
            if self.placed.get(&label) == Some(&id) {
                self.placed.remove(&label);
            } else if let Some(pos) = self.duplicates.iter().position(|&l| l == label) {
                self.duplicates.remove(pos);
            }
        }
    }

    fn alloc(&mut self, insn: Insn, prev: Option<InsnId>, next: Option<InsnId>) -> InsnId {
        let id = InsnId(self.nodes.len());
        for label in insn.labels() {
            self.next_label = max(self.next_label, label.0 + 1);
        }
        if let Insn::Label(label) = insn {
            match self.placed.entry(label) {
                MapEntry::Occupied(_) => {
                    warn!("label {:?} placed twice", label);
                    self.duplicates.push(label);
                },
                MapEntry::Vacant(entry) => {
                    entry.insert(id);
                },
            }
        }
        self.live += 1;
        self.nodes.push(Node { insn, prev, next });
        id
    }

    /// Obtains the instruction of a node.
    pub fn get(&self, id: InsnId) -> &Insn {
        &self.nodes[id.0].insn
    }

    /// Obtains the instruction of a node for modification.
    ///
    /// This is meant for retargeting branches. A label node must not be changed into another label this way, since
    /// the label lookup table would not follow.
    pub fn get_mut(&mut self, id: InsnId) -> &mut Insn {
        &mut self.nodes[id.0].insn
    }

    /// The first node.
    pub fn first(&self) -> Option<InsnId> {
        self.head
    }

    /// The node following `id`.
    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        self.nodes[id.0].next
    }

    /// The node where `label` is placed.
    pub fn label_node(&self, label: Label) -> Option<InsnId> {
        self.placed.get(&label).cloned()
    }

    /// The first real instruction at `id` or after it.
    pub fn real_at_or_after(&self, id: InsnId) -> Option<InsnId> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if self.get(c).is_real() {
                return Some(c);
            }
            cur = self.next(c);
        }
        None
    }

    /// The first real instruction strictly after `id`.
    pub fn next_real(&self, id: InsnId) -> Option<InsnId> {
        self.next(id).and_then(|n| self.real_at_or_after(n))
    }

    /// Iterates all nodes in list order.
    pub fn iter(&self) -> Iter {
        Iter {
            list: self,
            cur: self.head,
        }
    }
}

impl FromIterator<Insn> for InsnList {
    fn from_iter<I: IntoIterator<Item = Insn>>(iter: I) -> InsnList {
        let mut list = InsnList::new();
        for insn in iter {
            list.push(insn);
        }
        list
    }
}

/// The iterator type returned from `InsnList::iter`.
pub struct Iter<'a> {
    list: &'a InsnList,
    cur: Option<InsnId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InsnId, &'a Insn);
    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cur?;
        self.cur = self.list.next(id);
        Some((id, self.list.get(id)))
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Method & TryCatch

/// A row of the exception-handler table. Exceptions thrown in `[start, end)` transfer to `handler`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TryCatch {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
}

/// A method body as handed over by the bytecode reader.
#[derive(Clone, Debug, Default)]
pub struct Method {
    pub name: String,
    pub insns: InsnList,
    pub handlers: Vec<TryCatch>,
}

impl Method {
    /// Creates a method from a name and its instructions.
    pub fn new<S: Into<String>, I: IntoIterator<Item = Insn>>(name: S, insns: I) -> Method {
        Method {
            name: name.into(),
            insns: insns.into_iter().collect(),
            handlers: Vec::new(),
        }
    }

    /// Adds an exception handler row.
    pub fn with_handler(mut self, start: Label, end: Label, handler: Label) -> Method {
        self.handlers.push(TryCatch { start, end, handler });
        self
    }
}

//}}}

#[test]
fn test_insert_keeps_identities() {
    let mut list: InsnList = vec![Insn::Op(Op::Nop), Insn::Return].into_iter().collect();
    let first = list.first().unwrap();
    let ret = list.next(first).unwrap();
    let hit = list.insert_before(ret, Insn::Hit { slot: Slot(0), tag: None });
    let after = list.insert_after(ret, Insn::Line(3));

    assert_eq!(list.get(ret), &Insn::Return);
    let order = list.iter().map(|(id, _)| id).collect::<Vec<_>>();
    assert_eq!(order, vec![first, hit, ret, after]);
    assert_eq!(list.next_real(first), Some(hit));
    assert_eq!(list.next_real(ret), None);
}

#[test]
fn test_remove_unlinks_node_and_label() {
    let mut list: InsnList = vec![Insn::Label(Label(1)), Insn::Op(Op::Nop), Insn::Return].into_iter().collect();
    let label = list.first().unwrap();
    let nop = list.next(label).unwrap();
    list.remove(label);
    assert_eq!(list.first(), Some(nop));
    assert_eq!(list.label_node(Label(1)), None);
    let ret = list.next(nop).unwrap();
    list.remove(ret);
    assert_eq!(list.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![nop]);
    assert_eq!(list.len(), 1);

    list.remove(ret);
    list.remove(nop);
    assert_eq!(list.len(), 0);
    assert!(list.is_empty());
    assert_eq!(list.iter().count(), 0);
}

#[test]
fn test_label_placed_twice() {
    let mut list: InsnList = vec![
        Insn::Label(Label(0)),
        Insn::Op(Op::Nop),
        Insn::Label(Label(0)),
        Insn::Return,
    ].into_iter()
        .collect();
    assert_eq!(list.duplicate_label(), Some(Label(0)));
    let first = list.first().unwrap();
    assert_eq!(list.label_node(Label(0)), Some(first));

    let again = list.next(list.next(first).unwrap()).unwrap();
    list.remove(again);
    assert_eq!(list.duplicate_label(), None);
    assert_eq!(list.label_node(Label(0)), Some(first));
}

#[test]
fn test_new_label_avoids_existing_labels() {
    let mut list: InsnList = vec![Insn::Goto(Label(7)), Insn::Label(Label(7)), Insn::Return].into_iter().collect();
    let fresh = list.new_label();
    assert_eq!(fresh, Label(8));
    let node = list.label_node(Label(7)).unwrap();
    assert_eq!(list.get(list.real_at_or_after(node).unwrap()), &Insn::Return);
}
