//! Instruments whole methods.

use builder::build;
use error::*;
use graph::BlockGraph;
use guard::ReentryGuard;
use insert::{insert, SlotAllocator};
use insn::Method;
use offsets::Offsets;
use report::MethodCoverage;
use resolve::resolve;

/// The result of instrumenting one method.
pub type InstrumentOutcome = Result<MethodCoverage>;

/// Runs the block discovery, resolution and insertion passes over methods.
pub struct Instrumenter<'a> {
    alloc: &'a SlotAllocator,
    tag: Option<u32>,
}

impl<'a> Instrumenter<'a> {
    /// Creates an instrumenter drawing slots from `alloc`.
    pub fn new(alloc: &'a SlotAllocator) -> Instrumenter<'a> {
        Instrumenter { alloc, tag: None }
    }

    /// Makes the inserted hits subject to the caller filter, tagged with `tag`.
    pub fn with_caller_tag(mut self, tag: u32) -> Instrumenter<'a> {
        self.tag = Some(tag);
        self
    }

    /// Instruments one method in place.
    ///
    /// # Errors
    ///
    /// Returns any graph-consistency error found in the method. The method is left untouched in that case.
    pub fn instrument(&self, method: &mut Method) -> InstrumentOutcome {
        let _guard = ReentryGuard::enter();
        self.try_instrument(method)
            .chain_err(|| format!("cannot instrument method `{}`", method.name))
    }

    /// Instruments every method. A failure only affects the method it occurs in.
    pub fn instrument_all<'m, I>(&self, methods: I) -> Vec<InstrumentOutcome>
    where
        I: IntoIterator<Item = &'m mut Method>,
    {
        methods
            .into_iter()
            .map(|method| {
                let outcome = self.instrument(method);
                if let Err(ref e) = outcome {
                    warn!("{}", e);
                }
                outcome
            })
            .collect()
    }

    fn try_instrument(&self, method: &mut Method) -> Result<MethodCoverage> {
        let mut insns = method.insns.clone();
        let mut handlers = method.handlers.clone();

        let offsets = Offsets::compute(&insns);
        let cfg = build(&insns, &handlers, &offsets)?;
        let mut cfg = resolve(cfg, &offsets)?;

        let mut graph = BlockGraph::new(&cfg);
        graph.mark_unreachable();
        for node in graph.graph().raw_nodes() {
            cfg.blocks[node.weight.block.0].attr = node.weight.attr;
        }

        insert(&mut insns, &mut handlers, &mut cfg, self.alloc, self.tag)?;
        let coverage = MethodCoverage::new(method.name.clone(), &cfg, &offsets);
        debug!(
            "instrumented `{}`: {} blocks, {} slots",
            method.name,
            coverage.blocks.len(),
            coverage.entries.len()
        );

        method.insns = insns;
        method.handlers = handlers;
        Ok(coverage)
    }
}
