//! Structural change notifications fired by the graph editor.

use blocktype_common::{BlockId, GraphId};

use crate::ty::Ty;

/// What happened to the block named by a [`StructuralChange`].
#[derive(Clone, Debug, PartialEq)]
pub enum EditKind {
    /// The block's output was plugged into `new_parent.input_slot`.
    Plug,
    /// The block's output was unplugged from `old_parent.input_slot`.
    Unplug,
    /// The procedure name field of a definition block changed.
    Rename { new_name: String },
}

/// One structural edit, scoped to a single block in a single graph instance.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuralChange {
    pub kind: EditKind,
    pub block: BlockId,
    pub graph: GraphId,
    pub old_parent: Option<BlockId>,
    pub new_parent: Option<BlockId>,
    pub input_slot: Option<String>,
    /// Inferred output type of the moved subtree, when the editor knows it.
    pub subtree_ty: Option<Ty>,
    /// Type accepted by the input the block was plugged into. `None` accepts anything.
    pub target_accepts: Option<Ty>,
}

impl StructuralChange {
    pub fn plug(graph: GraphId, block: BlockId, parent: BlockId, slot: impl Into<String>) -> Self {
        StructuralChange {
            kind: EditKind::Plug,
            block,
            graph,
            old_parent: None,
            new_parent: Some(parent),
            input_slot: Some(slot.into()),
            subtree_ty: None,
            target_accepts: None,
        }
    }

    pub fn unplug(
        graph: GraphId,
        block: BlockId,
        parent: BlockId,
        slot: impl Into<String>,
    ) -> Self {
        StructuralChange {
            kind: EditKind::Unplug,
            block,
            graph,
            old_parent: Some(parent),
            new_parent: None,
            input_slot: Some(slot.into()),
            subtree_ty: None,
            target_accepts: None,
        }
    }

    pub fn rename(graph: GraphId, block: BlockId, new_name: impl Into<String>) -> Self {
        StructuralChange {
            kind: EditKind::Rename {
                new_name: new_name.into(),
            },
            block,
            graph,
            old_parent: None,
            new_parent: None,
            input_slot: None,
            subtree_ty: None,
            target_accepts: None,
        }
    }

    /// Attach the plugged subtree's output type.
    pub fn with_subtree_ty(mut self, ty: Ty) -> Self {
        self.subtree_ty = Some(ty);
        self
    }

    /// Attach the type accepted by the destination input.
    pub fn accepting(mut self, ty: Ty) -> Self {
        self.target_accepts = Some(ty);
        self
    }

    /// The parent on the side of the edit that matters: the new parent for a
    /// plug, the old parent for an unplug.
    pub fn parent(&self) -> Option<BlockId> {
        match self.kind {
            EditKind::Plug => self.new_parent,
            EditKind::Unplug => self.old_parent,
            EditKind::Rename { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_follows_edit_direction() {
        let plug = StructuralChange::plug(GraphId(0), BlockId(2), BlockId(1), "RETURN");
        assert_eq!(plug.parent(), Some(BlockId(1)));
        let mut moved = plug.clone();
        moved.old_parent = Some(BlockId(8));
        assert_eq!(moved.parent(), Some(BlockId(1)));
        let unplug = StructuralChange::unplug(GraphId(0), BlockId(2), BlockId(5), "VALUE");
        assert_eq!(unplug.parent(), Some(BlockId(5)));
        assert_eq!(StructuralChange::rename(GraphId(0), BlockId(1), "x").parent(), None);
    }

    #[test]
    fn builders_attach_types() {
        let event = StructuralChange::plug(GraphId(0), BlockId(2), BlockId(1), "VALUE")
            .with_subtree_ty(Ty::number())
            .accepting(Ty::string());
        assert_eq!(event.subtree_ty, Some(Ty::number()));
        assert_eq!(event.target_accepts, Some(Ty::string()));
    }
}
