//! The graph editor boundary.
//!
//! The core never touches rendering or DOM state directly. It issues
//! [`EditorRequest`]s, buffered for the duration of a propagation pass and
//! delivered through the [`GraphEditor`] trait once the pass has committed.

use blocktype_common::{BlockId, GraphId, SlotRef};

use crate::event::StructuralChange;
use crate::ty::Ty;
use crate::unify::TypeTable;

/// Queries and mutations the core needs from the block editor.
///
/// `disconnect_slot` and `connect_slot` return the structural change events
/// the editor fires synchronously in response. The propagator runs them
/// through its re-entrancy guard.
pub trait GraphEditor {
    /// Whether `block` currently exists in `graph`.
    fn contains_block(&self, graph: GraphId, block: BlockId) -> bool;

    /// Detach the block's output connection from whatever it is plugged into.
    fn disconnect_slot(&mut self, graph: GraphId, block: BlockId) -> Vec<StructuralChange>;

    /// Plug the block's output connection into `target`.
    fn connect_slot(&mut self, graph: GraphId, block: BlockId, target: &SlotRef)
        -> Vec<StructuralChange>;

    fn set_slot_type_expr(&mut self, graph: GraphId, slot: &SlotRef, ty: &Ty);

    fn recolor_by_type(&mut self, graph: GraphId, block: BlockId, ty: &Ty);

    fn request_render(&mut self, graph: GraphId, block: BlockId);

    fn reposition_block(&mut self, graph: GraphId, block: BlockId, dx: f64, dy: f64);

    /// Update the procedure name shown on a call block.
    fn set_procedure_name(&mut self, graph: GraphId, block: BlockId, name: &str);

    /// Rebuild a call block's argument inputs.
    fn update_shape(&mut self, graph: GraphId, block: BlockId, arg_names: &[String]);

    /// Nudge blocks near `block` so a detached subtree does not overlap them.
    fn bump_neighbours(&mut self, graph: GraphId, block: BlockId);
}

/// A deferred call into the [`GraphEditor`].
#[derive(Clone, Debug, PartialEq)]
pub enum EditorRequest {
    Disconnect { graph: GraphId, block: BlockId },
    Connect { graph: GraphId, block: BlockId, target: SlotRef },
    SetSlotType { graph: GraphId, slot: SlotRef, ty: Ty },
    RecolorByType { graph: GraphId, block: BlockId, ty: Ty },
    Render { graph: GraphId, block: BlockId },
    Reposition { graph: GraphId, block: BlockId, dx: f64, dy: f64 },
    SetProcedureName { graph: GraphId, block: BlockId, name: String },
    UpdateShape { graph: GraphId, block: BlockId, arg_names: Vec<String> },
    BumpNeighbours { graph: GraphId, block: BlockId },
}

impl EditorRequest {
    /// The block this request acts on.
    pub fn block(&self) -> BlockId {
        match self {
            EditorRequest::SetSlotType { slot, .. } => slot.block,
            EditorRequest::Disconnect { block, .. }
            | EditorRequest::Connect { block, .. }
            | EditorRequest::RecolorByType { block, .. }
            | EditorRequest::Render { block, .. }
            | EditorRequest::Reposition { block, .. }
            | EditorRequest::SetProcedureName { block, .. }
            | EditorRequest::UpdateShape { block, .. }
            | EditorRequest::BumpNeighbours { block, .. } => *block,
        }
    }

    /// The graph instance this request targets.
    pub fn graph(&self) -> GraphId {
        match self {
            EditorRequest::Disconnect { graph, .. }
            | EditorRequest::Connect { graph, .. }
            | EditorRequest::SetSlotType { graph, .. }
            | EditorRequest::RecolorByType { graph, .. }
            | EditorRequest::Render { graph, .. }
            | EditorRequest::Reposition { graph, .. }
            | EditorRequest::SetProcedureName { graph, .. }
            | EditorRequest::UpdateShape { graph, .. }
            | EditorRequest::BumpNeighbours { graph, .. } => *graph,
        }
    }

    /// Deliver the request. Types are resolved first so the editor only sees
    /// final representatives.
    pub(crate) fn apply(
        self,
        editor: &mut dyn GraphEditor,
        types: &mut TypeTable,
    ) -> Vec<StructuralChange> {
        match self {
            EditorRequest::Disconnect { graph, block } => editor.disconnect_slot(graph, block),
            EditorRequest::Connect { graph, block, target } => {
                editor.connect_slot(graph, block, &target)
            }
            EditorRequest::SetSlotType { graph, slot, ty } => {
                editor.set_slot_type_expr(graph, &slot, &types.resolve(&ty));
                Vec::new()
            }
            EditorRequest::RecolorByType { graph, block, ty } => {
                editor.recolor_by_type(graph, block, &types.resolve(&ty));
                Vec::new()
            }
            EditorRequest::Render { graph, block } => {
                editor.request_render(graph, block);
                Vec::new()
            }
            EditorRequest::Reposition { graph, block, dx, dy } => {
                editor.reposition_block(graph, block, dx, dy);
                Vec::new()
            }
            EditorRequest::SetProcedureName { graph, block, name } => {
                editor.set_procedure_name(graph, block, &name);
                Vec::new()
            }
            EditorRequest::UpdateShape { graph, block, arg_names } => {
                editor.update_shape(graph, block, &arg_names);
                Vec::new()
            }
            EditorRequest::BumpNeighbours { graph, block } => {
                editor.bump_neighbours(graph, block);
                Vec::new()
            }
        }
    }
}
