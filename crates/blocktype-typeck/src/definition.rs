//! Procedure definition nodes and the return-slot propagation rules.
//!
//! A let-definition owns one return type expression. Plugging a body into
//! its `RETURN` input narrows that type and pushes it to every call site;
//! unplugging the body makes the definition polymorphic again.

use tracing::debug;

use blocktype_common::{BlockId, GraphId, ParamId, SlotRef, RETURN_SLOT};

use crate::call_site::Connection;
use crate::editor::EditorRequest;
use crate::error::ProcedureError;
use crate::propagate::Pass;
use crate::ty::Ty;

/// One declared procedure parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub id: ParamId,
    pub name: String,
}

impl Param {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Param {
            id: ParamId::new(id),
            name: name.into(),
        }
    }

    /// Pair up the editor's parallel name and id lists.
    pub fn zip(names: &[String], ids: &[ParamId]) -> Result<Vec<Param>, ProcedureError> {
        if names.len() != ids.len() {
            tracing::error!(
                names = names.len(),
                ids = ids.len(),
                "editor supplied inconsistent parameter lists"
            );
            return Err(ProcedureError::LengthMismatch {
                names: names.len(),
                ids: ids.len(),
            });
        }
        Ok(names
            .iter()
            .zip(ids)
            .map(|(name, id)| Param {
                id: id.clone(),
                name: name.clone(),
            })
            .collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefinitionKind {
    /// A let-style definition that always returns a value.
    Let,
    /// A procedure without a return value.
    Void,
}

/// Read access shared by every kind of definition block.
pub trait TypedProcedureDefinition {
    fn name(&self) -> &str;

    fn params(&self) -> &[Param];

    /// The inferred return type; `None` for void procedures.
    fn return_ty(&self) -> Option<&Ty>;

    fn is_returning(&self) -> bool {
        self.return_ty().is_some()
    }
}

/// A let-bound procedure whose return type is inferred.
#[derive(Clone, Debug)]
pub struct LetDefinition {
    pub block: BlockId,
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Ty,
    /// Root of the subtree plugged into the `RETURN` input.
    pub body: Option<BlockId>,
}

impl LetDefinition {
    pub fn new(block: BlockId, name: impl Into<String>, ret: Ty) -> Self {
        LetDefinition {
            block,
            name: name.into(),
            params: Vec::new(),
            ret,
            body: None,
        }
    }
}

/// A statement procedure; it has no type slot.
#[derive(Clone, Debug)]
pub struct VoidDefinition {
    pub block: BlockId,
    pub name: String,
    pub params: Vec<Param>,
}

impl TypedProcedureDefinition for LetDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> &[Param] {
        &self.params
    }

    fn return_ty(&self) -> Option<&Ty> {
        Some(&self.ret)
    }
}

impl TypedProcedureDefinition for VoidDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> &[Param] {
        &self.params
    }

    fn return_ty(&self) -> Option<&Ty> {
        None
    }
}

#[derive(Clone, Debug)]
pub enum Definition {
    Let(LetDefinition),
    Void(VoidDefinition),
}

impl Definition {
    pub fn block(&self) -> BlockId {
        match self {
            Definition::Let(def) => def.block,
            Definition::Void(def) => def.block,
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        match self {
            Definition::Let(_) => DefinitionKind::Let,
            Definition::Void(_) => DefinitionKind::Void,
        }
    }

    pub fn as_let(&self) -> Option<&LetDefinition> {
        match self {
            Definition::Let(def) => Some(def),
            Definition::Void(_) => None,
        }
    }

    pub(crate) fn as_let_mut(&mut self) -> Option<&mut LetDefinition> {
        match self {
            Definition::Let(def) => Some(def),
            Definition::Void(_) => None,
        }
    }

    fn set_name(&mut self, name: &str) {
        match self {
            Definition::Let(def) => def.name = name.to_string(),
            Definition::Void(def) => def.name = name.to_string(),
        }
    }

    fn set_params(&mut self, params: Vec<Param>) {
        match self {
            Definition::Let(def) => def.params = params,
            Definition::Void(def) => def.params = params,
        }
    }
}

impl TypedProcedureDefinition for Definition {
    fn name(&self) -> &str {
        match self {
            Definition::Let(def) => def.name(),
            Definition::Void(def) => def.name(),
        }
    }

    fn params(&self) -> &[Param] {
        match self {
            Definition::Let(def) => def.params(),
            Definition::Void(def) => def.params(),
        }
    }

    fn return_ty(&self) -> Option<&Ty> {
        match self {
            Definition::Let(def) => def.return_ty(),
            Definition::Void(def) => def.return_ty(),
        }
    }
}

/// A structural change on a definition's `RETURN` input.
#[derive(Clone, Debug, PartialEq)]
pub enum ReturnSlotChange {
    /// A subtree with the given output type was plugged in.
    Plugged { subtree: BlockId, ty: Ty },
    /// The subtree was unplugged.
    Unplugged,
}

// ── Propagation rules ──────────────────────────────────────────────────

impl Pass<'_> {
    fn let_definition_mut(
        &mut self,
        graph: GraphId,
        block: BlockId,
    ) -> Result<&mut LetDefinition, ProcedureError> {
        self.graph_mut(graph)?
            .definition_mut(block)
            .and_then(Definition::as_let_mut)
            .ok_or(ProcedureError::UnknownBlock { graph, block })
    }

    fn definition_name(&self, graph: GraphId, block: BlockId) -> Result<String, ProcedureError> {
        self.registry
            .graph(graph)
            .ok_or(ProcedureError::UnknownGraph(graph))?
            .definition(block)
            .map(|def| def.name().to_string())
            .ok_or(ProcedureError::UnknownBlock { graph, block })
    }

    /// Register a new definition block under a legal form of `name`.
    pub(crate) fn create_definition(
        &mut self,
        graph: GraphId,
        block: BlockId,
        name: &str,
        kind: DefinitionKind,
        params: Vec<Param>,
    ) -> Result<String, ProcedureError> {
        let name = self.registry.find_legal_name(graph, name);
        let def = match kind {
            DefinitionKind::Let => {
                let ret = self.types().fresh_var();
                self.request(EditorRequest::SetSlotType {
                    graph,
                    slot: SlotRef::input(block, RETURN_SLOT),
                    ty: ret.clone(),
                });
                let mut def = LetDefinition::new(block, name.clone(), ret);
                def.params = params;
                Definition::Let(def)
            }
            DefinitionKind::Void => Definition::Void(VoidDefinition {
                block,
                name: name.clone(),
                params,
            }),
        };
        let g = self.graph_mut(graph)?;
        if !g.index_mut().register_definition(&name, block) {
            return Err(ProcedureError::NameConflict { name, graph });
        }
        g.insert_definition(def);
        debug!(%graph, %block, %name, "definition created");

        if self.registry.is_main(graph) {
            self.adopt_callers(&name)?;
        }
        Ok(name)
    }

    /// The return input gained or lost its subtree.
    pub(crate) fn on_return_slot_change(
        &mut self,
        graph: GraphId,
        block: BlockId,
        change: ReturnSlotChange,
    ) -> Result<(), ProcedureError> {
        match change {
            ReturnSlotChange::Plugged { subtree, ty } => {
                self.on_return_plugged(graph, block, subtree, ty)
            }
            ReturnSlotChange::Unplugged => self.on_return_unplugged(graph, block),
        }
    }

    /// Narrow the return type to the plugged subtree's type.
    ///
    /// Call sites whose type no longer matches are detached, offset and left
    /// for the user to reconnect.
    fn on_return_plugged(
        &mut self,
        graph: GraphId,
        block: BlockId,
        subtree: BlockId,
        subtree_ty: Ty,
    ) -> Result<(), ProcedureError> {
        let (name, old) = {
            let def = self.let_definition_mut(graph, block)?;
            def.body = Some(subtree);
            (def.name.clone(), def.ret.clone())
        };

        // Call-site usage may already have narrowed the variable. The new
        // body wins; stale narrowing moves to a fresh variable.
        let new = match self.types().unify(&old, &subtree_ty) {
            Ok(()) => old,
            Err(err) => {
                debug!(
                    %name,
                    %err,
                    "body type conflicts with call-site usage; rebinding return slot"
                );
                let fresh = self.types().fresh_var();
                self.types().unify(&fresh, &subtree_ty)?;
                fresh
            }
        };
        self.let_definition_mut(graph, block)?.ret = new.clone();
        self.request(EditorRequest::SetSlotType {
            graph,
            slot: SlotRef::input(block, RETURN_SLOT),
            ty: new.clone(),
        });

        let offset = self.config.detach_offset;
        for (g, call) in self.registry.callers_of(&name) {
            let Some((output, connection)) = self.value_output(g, call) else {
                continue;
            };
            if self.types().same_type(&output, &new) {
                self.value_call_mut(g, call)?.output = new.clone();
                self.request_retype(g, call, &new);
                continue;
            }
            debug!(%name, call = %call, "call site type changed; detaching");
            if matches!(connection, Connection::ConnectedTo(_)) {
                self.request(EditorRequest::Disconnect { graph: g, block: call });
            }
            self.request(EditorRequest::Reposition {
                graph: g,
                block: call,
                dx: offset.dx,
                dy: offset.dy,
            });
            let slot = self.value_call_mut(g, call)?;
            slot.connection = Connection::Detached;
            slot.output = new.clone();
            self.request_retype(g, call, &new);
        }
        Ok(())
    }

    /// Reset the return type to a fresh variable and rebind every call site
    /// to it, reconnecting each one to the input it fed before.
    fn on_return_unplugged(
        &mut self,
        graph: GraphId,
        block: BlockId,
    ) -> Result<(), ProcedureError> {
        let fresh = self.types().fresh_var();
        let name = {
            let def = self.let_definition_mut(graph, block)?;
            def.body = None;
            def.ret = fresh.clone();
            def.name.clone()
        };
        self.request(EditorRequest::SetSlotType {
            graph,
            slot: SlotRef::input(block, RETURN_SLOT),
            ty: fresh.clone(),
        });

        for (g, call) in self.registry.callers_of(&name) {
            let Some((_, connection)) = self.value_output(g, call) else {
                continue;
            };
            if let Connection::ConnectedTo(target) = &connection {
                self.request(EditorRequest::Disconnect { graph: g, block: call });
                if let Some(accepts) = &target.accepts {
                    self.types().unify(&fresh, accepts)?;
                }
                self.request(EditorRequest::Connect {
                    graph: g,
                    block: call,
                    target: target.slot.clone(),
                });
            }
            self.value_call_mut(g, call)?.output = fresh.clone();
            self.request_retype(g, call, &fresh);
        }
        Ok(())
    }

    /// Rename a definition, moving its index entry and every call site with it.
    pub(crate) fn rename_definition(
        &mut self,
        graph: GraphId,
        block: BlockId,
        new_name: &str,
    ) -> Result<(), ProcedureError> {
        let old = self.definition_name(graph, block)?;
        if old == new_name {
            return Ok(());
        }
        let taken = self
            .registry
            .graph(graph)
            .and_then(|g| g.index().definition(new_name))
            .is_some_and(|other| other != block);
        if taken {
            return Err(ProcedureError::NameConflict {
                name: new_name.to_string(),
                graph,
            });
        }

        self.rename_entry(graph, &old, new_name)?;
        self.graph_mut(graph)?
            .definition_mut(block)
            .ok_or(ProcedureError::UnknownBlock { graph, block })?
            .set_name(new_name);
        debug!(%graph, from = %old, to = %new_name, "definition renamed");

        if self.registry.is_main(graph) {
            // Preview graphs follow the main definition unless they carry
            // their own copy of it.
            for aux in self.registry.graph_ids() {
                let follows = aux != graph
                    && self
                        .registry
                        .graph(aux)
                        .is_some_and(|g| {
                            g.index().contains(&old) && g.index().definition(&old).is_none()
                        });
                if follows {
                    self.rename_entry(aux, &old, new_name)?;
                }
            }
            self.adopt_callers(new_name)?;
        }
        Ok(())
    }

    fn rename_entry(&mut self, graph: GraphId, old: &str, new: &str) -> Result<(), ProcedureError> {
        let moved = self.registry.find_call_sites(old, graph);
        let g = self.graph_mut(graph)?;
        if !g.index_mut().rekey(old, new) {
            return Err(ProcedureError::NameConflict {
                name: new.to_string(),
                graph,
            });
        }
        for &call in &moved {
            if let Some(site) = g.call_site_mut(call) {
                site.set_procedure_name(new);
            }
        }
        for call in moved {
            self.request(EditorRequest::SetProcedureName {
                graph,
                block: call,
                name: new.to_string(),
            });
        }
        Ok(())
    }

    /// Delete a definition block. Its call sites stay behind, disconnected
    /// and polymorphic.
    pub(crate) fn delete_definition(
        &mut self,
        graph: GraphId,
        block: BlockId,
    ) -> Result<(), ProcedureError> {
        let def = self
            .graph_mut(graph)?
            .remove_definition(block)
            .ok_or(ProcedureError::UnknownBlock { graph, block })?;
        debug!(%graph, %block, name = %def.name(), "definition deleted");
        if !self.registry.is_main(graph) {
            return Ok(());
        }
        for (g, call) in self.registry.callers_of(def.name()) {
            let Some((_, connection)) = self.value_output(g, call) else {
                continue;
            };
            if matches!(connection, Connection::ConnectedTo(_)) {
                self.request(EditorRequest::Disconnect { graph: g, block: call });
            }
            let fresh = self.types().fresh_var();
            let slot = self.value_call_mut(g, call)?;
            slot.connection = Connection::Detached;
            slot.output = fresh.clone();
            self.request_retype(g, call, &fresh);
        }
        Ok(())
    }

    /// Replace a definition's parameter list and reshape its call sites.
    pub(crate) fn set_definition_params(
        &mut self,
        graph: GraphId,
        block: BlockId,
        names: &[String],
        ids: &[ParamId],
    ) -> Result<(), ProcedureError> {
        let params = Param::zip(names, ids)?;
        let def = self
            .graph_mut(graph)?
            .definition_mut(block)
            .ok_or(ProcedureError::UnknownBlock { graph, block })?;
        def.set_params(params);
        let name = def.name().to_string();
        for call in self.registry.find_call_sites(&name, graph) {
            self.on_parameter_shape_change(graph, call, names, ids)?;
        }
        Ok(())
    }

    /// Bind waiting call sites of `name` to the main definition's return type.
    ///
    /// A call site whose own constraint conflicts is detached and offset
    /// rather than failing the whole pass.
    pub(crate) fn adopt_callers(&mut self, name: &str) -> Result<(), ProcedureError> {
        let def_ty = self.definition_return(name);
        let offset = self.config.detach_offset;
        for (g, call) in self.registry.callers_of(name) {
            let Some((output, connection)) = self.value_output(g, call) else {
                continue;
            };
            if self.types().same_type(&output, &def_ty) {
                self.value_call_mut(g, call)?.output = def_ty.clone();
                continue;
            }
            if let Err(err) = self.types().unify(&output, &def_ty) {
                debug!(%name, call = %call, %err, "call site conflicts with definition; detaching");
                if matches!(connection, Connection::ConnectedTo(_)) {
                    self.request(EditorRequest::Disconnect { graph: g, block: call });
                }
                self.request(EditorRequest::Reposition {
                    graph: g,
                    block: call,
                    dx: offset.dx,
                    dy: offset.dy,
                });
                self.value_call_mut(g, call)?.connection = Connection::Detached;
            }
            self.value_call_mut(g, call)?.output = def_ty.clone();
            self.request_retype(g, call, &def_ty);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_pairs_names_and_ids() {
        let params = Param::zip(
            &["x".to_string(), "y".to_string()],
            &[ParamId::new("a"), ParamId::new("b")],
        )
        .unwrap();
        assert_eq!(params, vec![Param::new("a", "x"), Param::new("b", "y")]);
    }

    #[test]
    fn zip_rejects_length_mismatch() {
        let err = Param::zip(&["x".to_string()], &[]).unwrap_err();
        assert_eq!(err, ProcedureError::LengthMismatch { names: 1, ids: 0 });
    }

    #[test]
    fn definition_capabilities() {
        let def = Definition::Let(LetDefinition::new(BlockId(1), "foo", Ty::number()));
        assert!(def.is_returning());
        assert_eq!(def.kind(), DefinitionKind::Let);
        assert_eq!(def.return_ty(), Some(&Ty::number()));

        let void = Definition::Void(VoidDefinition {
            block: BlockId(2),
            name: "draw".into(),
            params: vec![Param::new("p", "size")],
        });
        assert!(!void.is_returning());
        assert_eq!(void.kind(), DefinitionKind::Void);
        assert_eq!(void.params().len(), 1);
        assert!(void.as_let().is_none());
    }
}
