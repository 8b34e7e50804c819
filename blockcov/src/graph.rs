//! A petgraph view of the resolved blocks of one method, used for reachability analysis and for debugging dumps.

use block::*;
use insn::Slot;
use resolve::ResolvedCfg;
use snapshot::Snapshot;

use fixedbitset::FixedBitSet;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef, IntoNodeReferences};

use std::io;

//----------------------------------------------------------------------------------------------------------------------
//{{{ BlockGraph

/// Information about a block in the graph.
#[derive(Clone, Debug)]
pub struct NodeInfo {
    /// Index of the block in the resolved arena.
    pub block: BlockIndex,
    pub start: u32,
    pub end: u32,
    pub attr: BlockAttr,
    /// Slots of all entries of the block.
    pub slots: Vec<Slot>,
    /// Total execution count of the block, once [counts are applied](struct.BlockGraph.html#method.apply_counts).
    pub count: Option<u64>,
}

/// Information about a control transfer between two blocks.
#[derive(Clone, Debug)]
pub struct EdgeInfo {
    /// The reason of the entry this edge leads to.
    pub reason: EntryReason,
    pub slot: Option<Slot>,
    pub count: Option<u64>,
}

/// The block graph of one method. Nodes are added in offset order, so the node index equals the block's rank.
#[derive(Clone, Debug, Default)]
pub struct BlockGraph {
    graph: DiGraph<NodeInfo, EdgeInfo>,
}

impl BlockGraph {
    /// Creates the graph from resolved blocks.
    ///
    /// Every exit target becomes an edge, and every block without an exit gets a fall-through edge to the next block.
    pub fn new(cfg: &ResolvedCfg) -> BlockGraph {
        let mut graph = DiGraph::with_capacity(cfg.blocks.len(), cfg.blocks.len() * 2);
        for &bi in &cfg.order {
            let block = &cfg.blocks[bi.0];
            graph.add_node(NodeInfo {
                block: bi,
                start: block.start.unwrap_or_default(),
                end: block.end.unwrap_or_default(),
                attr: block.attr,
                slots: block.entries.iter().filter_map(|e| e.slot).collect(),
                count: None,
            });
        }

        let node = |bi: BlockIndex| NodeIndex::new(cfg.rank[bi.0]);
        for (pos, &bi) in cfg.order.iter().enumerate() {
            let block = &cfg.blocks[bi.0];
            let targets = match block.exit {
                Some(ref exit) => exit.kind.targets(),
                None => match cfg.order.get(pos + 1) {
                    Some(&next) => {
                        let entries = &cfg.blocks[next.0].entries;
                        let entry = entries.iter().position(|e| e.reason == EntryReason::FallThrough);
                        entry.map(|entry| Target { block: next, entry }).into_iter().collect()
                    },
                    None => Vec::new(),
                },
            };
            for target in targets {
                let entry = &cfg.blocks[target.block.0].entries[target.entry];
                graph.add_edge(
                    node(bi),
                    node(target.block),
                    EdgeInfo {
                        reason: entry.reason,
                        slot: entry.slot,
                        count: None,
                    },
                );
            }
        }

        BlockGraph { graph }
    }

    /// The underlying graph.
    pub fn graph(&self) -> &DiGraph<NodeInfo, EdgeInfo> {
        &self.graph
    }

    /// Finds the blocks reachable from the method entry or from an exception handler, and marks all others as
    /// [`UNREACHABLE`]. Returns the set of reachable node indices.
    ///
    /// [`UNREACHABLE`]: ../block/struct.BlockAttr.html#associatedconstant.UNREACHABLE
    pub fn mark_unreachable(&mut self) -> FixedBitSet {
        let roots = self.graph
            .node_references()
            .filter(|&(_, n)| n.attr.intersects(BlockAttr::ENTRY | BlockAttr::CATCH))
            .map(|(ni, _)| ni)
            .collect();

        let mut dfs = Dfs::empty(&self.graph);
        dfs.stack = roots;
        while let Some(ni) = dfs.next(&self.graph) {
            trace!("reachable: {:?}", self.graph[ni].block);
        }
        let reachable = dfs.discovered;

        for (i, node) in self.graph.node_weights_mut().enumerate() {
            if reachable.contains(i) {
                node.attr.remove(BlockAttr::UNREACHABLE);
            } else {
                node.attr.insert(BlockAttr::UNREACHABLE);
            }
        }
        reachable
    }

    /// Fills in the execution counts of blocks and edges from a snapshot.
    ///
    /// A block count is the sum of the counts of all its entries.
    pub fn apply_counts(&mut self, snapshot: &Snapshot) {
        for node in self.graph.node_weights_mut() {
            node.count = Some(node.slots.iter().map(|&s| snapshot.count(s)).sum());
        }
        for edge in self.graph.edge_weights_mut() {
            edge.count = edge.slot.map(|s| snapshot.count(s));
        }
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Graphviz

/// Block kind shown in dumps.
fn kind(attr: BlockAttr) -> &'static str {
    if attr.contains(BlockAttr::UNREACHABLE) {
        "dead"
    } else if attr.contains(BlockAttr::ENTRY) {
        "entry"
    } else if attr.contains(BlockAttr::CATCH) {
        "catch"
    } else {
        "block"
    }
}

fn count_label(count: Option<u64>) -> String {
    count.map_or_else(|| "?".to_owned(), |c| c.to_string())
}

impl BlockGraph {
    /// Writes out the graph in Graphviz `*.dot` format, one box per block labelled with its offsets and count.
    /// Fall-through edges are drawn bold; blocks never executed are red once counts are applied.
    pub fn write_dot<W: io::Write>(&self, method_name: &str, mut writer: W) -> io::Result<()> {
        writeln!(writer, "digraph {{\n\tlabel=\"{}\"\n\tnode[shape=box]", method_name.replace('"', "\\\""))?;
        for (ni, node) in self.graph.node_references() {
            let color = if node.count == Some(0) { "red" } else { "black" };
            writeln!(
                writer,
                "\t{} [label=\"{} @{}..{}\\n{}\", color={}]",
                ni.index(),
                kind(node.attr),
                node.start,
                node.end,
                count_label(node.count),
                color,
            )?;
        }
        for edge_ref in self.graph.edge_references() {
            let edge = edge_ref.weight();
            let style = if edge.reason.is_physical() { "bold" } else { "solid" };
            writeln!(
                writer,
                "\t{} -> {} [style={}, label=\"{} {}\"]",
                edge_ref.source().index(),
                edge_ref.target().index(),
                style,
                edge.reason.tag(),
                count_label(edge.count),
            )?;
        }
        writeln!(writer, "}}")
    }
}

//}}}
