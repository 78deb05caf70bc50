//! A headless [`GraphEditor`] that keeps block state in memory.
//!
//! Used by the command-line driver and the tests in place of a rendering
//! editor. User-level edits (`plug`, `unplug`, `rename`) mutate the blocks
//! and return the [`StructuralChange`] the host should hand to the
//! propagator; the `undo_*` methods revert them when the propagator rejects
//! the change.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use blocktype_common::{BlockId, GraphId, SlotRef, OUTPUT_SLOT};

use crate::config::PropagatorConfig;
use crate::editor::GraphEditor;
use crate::event::{EditKind, StructuralChange};
use crate::ty::Ty;

/// Everything the headless editor knows about one block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EditorBlock {
    pub position: (f64, f64),
    /// The input this block's output is plugged into.
    pub parent: Option<SlotRef>,
    pub hue: Option<u16>,
    /// Type expressions shown on this block's slots, keyed by slot name.
    pub slot_types: BTreeMap<String, Ty>,
    /// Types the block's inputs accept, keyed by input name.
    pub checks: BTreeMap<String, Ty>,
    /// Fixed output type of a non-procedure block, e.g. a number literal.
    pub output: Option<Ty>,
    pub procedure_name: Option<String>,
    pub arg_names: Vec<String>,
    pub renders: u32,
    pub bumps: u32,
}

impl EditorBlock {
    /// The type currently shown on the output slot.
    pub fn output_slot_type(&self) -> Option<&Ty> {
        self.slot_types.get(OUTPUT_SLOT)
    }
}

#[derive(Default)]
pub struct MemoryEditor {
    config: PropagatorConfig,
    graphs: FxHashMap<GraphId, BTreeMap<BlockId, EditorBlock>>,
}

impl MemoryEditor {
    pub fn new(config: PropagatorConfig) -> Self {
        MemoryEditor {
            config,
            graphs: FxHashMap::default(),
        }
    }

    // ── Blocks ─────────────────────────────────────────────────────────

    /// Add a block at the origin, replacing any block with the same id.
    pub fn add_block(&mut self, graph: GraphId, block: BlockId) -> &mut EditorBlock {
        let blocks = self.graphs.entry(graph).or_default();
        blocks.insert(block, EditorBlock::default());
        blocks.entry(block).or_default()
    }

    /// Add a block with a fixed output type, such as a literal.
    pub fn add_literal(&mut self, graph: GraphId, block: BlockId, ty: Ty) -> &mut EditorBlock {
        let literal = self.add_block(graph, block);
        literal.output = Some(ty);
        literal
    }

    /// Add a procedure block showing `name`.
    pub fn add_procedure_block(
        &mut self,
        graph: GraphId,
        block: BlockId,
        name: &str,
    ) -> &mut EditorBlock {
        let procedure = self.add_block(graph, block);
        procedure.procedure_name = Some(name.to_string());
        procedure
    }

    pub fn remove_block(&mut self, graph: GraphId, block: BlockId) -> Option<EditorBlock> {
        let blocks = self.graphs.get_mut(&graph)?;
        let removed = blocks.remove(&block)?;
        for other in blocks.values_mut() {
            if other.parent.as_ref().is_some_and(|p| p.block == block) {
                other.parent = None;
            }
        }
        Some(removed)
    }

    pub fn block(&self, graph: GraphId, block: BlockId) -> Option<&EditorBlock> {
        self.graphs.get(&graph)?.get(&block)
    }

    pub fn block_mut(&mut self, graph: GraphId, block: BlockId) -> Option<&mut EditorBlock> {
        self.graphs.get_mut(&graph)?.get_mut(&block)
    }

    /// The input `block` is plugged into.
    pub fn parent_of(&self, graph: GraphId, block: BlockId) -> Option<&SlotRef> {
        self.block(graph, block)?.parent.as_ref()
    }

    /// The block plugged into `slot`, if any.
    pub fn child_at(&self, graph: GraphId, slot: &SlotRef) -> Option<BlockId> {
        self.graphs
            .get(&graph)?
            .iter()
            .find(|(_, b)| b.parent.as_ref() == Some(slot))
            .map(|(id, _)| *id)
    }

    /// Declare the type an input accepts.
    pub fn set_check(&mut self, graph: GraphId, slot: &SlotRef, ty: Ty) {
        if let Some(block) = self.block_mut(graph, slot.block) {
            block.checks.insert(slot.name.clone(), ty);
        }
    }

    // ── User edits ─────────────────────────────────────────────────────

    /// Plug `block` into `target` as the user would.
    ///
    /// The returned change carries the block's fixed output type and the
    /// type the target input accepts, when known.
    pub fn plug(&mut self, graph: GraphId, block: BlockId, target: &SlotRef) -> StructuralChange {
        let accepts = self
            .block(graph, target.block)
            .and_then(|b| b.checks.get(&target.name).cloned());
        let output = self.block(graph, block).and_then(|b| b.output.clone());
        if let Some(b) = self.block_mut(graph, block) {
            b.parent = Some(target.clone());
        }
        let mut change = StructuralChange::plug(graph, block, target.block, target.name.clone());
        change.subtree_ty = output;
        change.target_accepts = accepts;
        change
    }

    /// Unplug `block` from wherever it is connected. `None` if it was not
    /// connected.
    pub fn unplug(&mut self, graph: GraphId, block: BlockId) -> Option<StructuralChange> {
        let parent = self.block_mut(graph, block)?.parent.take()?;
        Some(StructuralChange::unplug(graph, block, parent.block, parent.name))
    }

    /// Change the name shown on a definition block.
    pub fn rename(&mut self, graph: GraphId, block: BlockId, name: &str) -> StructuralChange {
        if let Some(b) = self.block_mut(graph, block) {
            b.procedure_name = Some(name.to_string());
        }
        StructuralChange::rename(graph, block, name)
    }

    pub fn undo_plug(&mut self, change: &StructuralChange) {
        if let Some(b) = self.block_mut(change.graph, change.block) {
            b.parent = None;
        }
    }

    pub fn undo_unplug(&mut self, change: &StructuralChange) {
        let (Some(parent), Some(slot)) = (change.old_parent, change.input_slot.clone()) else {
            return;
        };
        if let Some(b) = self.block_mut(change.graph, change.block) {
            b.parent = Some(SlotRef::input(parent, slot));
        }
    }

    /// Revert a rejected change of any kind. `old_name` is the name a
    /// rejected rename replaced.
    pub fn undo(&mut self, change: &StructuralChange, old_name: Option<&str>) {
        match &change.kind {
            EditKind::Plug => self.undo_plug(change),
            EditKind::Unplug => self.undo_unplug(change),
            EditKind::Rename { .. } => {
                if let Some(b) = self.block_mut(change.graph, change.block) {
                    b.procedure_name = old_name.map(str::to_string);
                }
            }
        }
    }
}

impl GraphEditor for MemoryEditor {
    fn contains_block(&self, graph: GraphId, block: BlockId) -> bool {
        self.block(graph, block).is_some()
    }

    fn disconnect_slot(&mut self, graph: GraphId, block: BlockId) -> Vec<StructuralChange> {
        self.unplug(graph, block).into_iter().collect()
    }

    fn connect_slot(
        &mut self,
        graph: GraphId,
        block: BlockId,
        target: &SlotRef,
    ) -> Vec<StructuralChange> {
        vec![self.plug(graph, block, target)]
    }

    fn set_slot_type_expr(&mut self, graph: GraphId, slot: &SlotRef, ty: &Ty) {
        if let Some(b) = self.block_mut(graph, slot.block) {
            b.slot_types.insert(slot.name.clone(), ty.clone());
        }
    }

    fn recolor_by_type(&mut self, graph: GraphId, block: BlockId, ty: &Ty) {
        let hue = self.config.hue_for(ty.con_name());
        if let Some(b) = self.block_mut(graph, block) {
            b.hue = Some(hue);
        }
    }

    fn request_render(&mut self, graph: GraphId, block: BlockId) {
        if let Some(b) = self.block_mut(graph, block) {
            b.renders += 1;
        }
    }

    fn reposition_block(&mut self, graph: GraphId, block: BlockId, dx: f64, dy: f64) {
        if let Some(b) = self.block_mut(graph, block) {
            b.position.0 += dx;
            b.position.1 += dy;
        }
    }

    fn set_procedure_name(&mut self, graph: GraphId, block: BlockId, name: &str) {
        if let Some(b) = self.block_mut(graph, block) {
            b.procedure_name = Some(name.to_string());
        }
    }

    fn update_shape(&mut self, graph: GraphId, block: BlockId, arg_names: &[String]) {
        if let Some(b) = self.block_mut(graph, block) {
            b.arg_names = arg_names.to_vec();
        }
    }

    fn bump_neighbours(&mut self, graph: GraphId, block: BlockId) {
        if let Some(b) = self.block_mut(graph, block) {
            b.bumps += 1;
        }
    }
}
