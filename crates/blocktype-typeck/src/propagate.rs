//! The change propagator.
//!
//! Every structural edit runs as one transaction:
//!
//! ```text
//! Idle -> Resolving -> Propagating -> RenderRequested -> Idle
//! ```
//!
//! `Resolving` decides which propagation rules an event triggers.
//! `Propagating` applies them against the registry while buffering editor
//! requests. If any rule fails, the touched graphs and the type table are
//! restored and no request reaches the editor. Otherwise the table is
//! committed and the buffered requests are flushed in `RenderRequested`.
//!
//! Events the editor fires while a transaction is in flight (the echo of a
//! programmatic disconnect, for instance) are discarded.

use rustc_hash::FxHashMap;
use tracing::{debug, error, trace, warn};

use blocktype_common::{BlockId, GraphId, ParamId, PersistedGraph, SlotRef, RETURN_SLOT};

use crate::call_site::{
    arg_index, ArgSlot, CallKind, CallSite, Connection, StatementCall, Target,
    TypedProcedureCall, ValueCall,
};
use crate::config::PropagatorConfig;
use crate::definition::{
    Definition, DefinitionKind, LetDefinition, Param, ReturnSlotChange, VoidDefinition,
};
use crate::editor::{EditorRequest, GraphEditor};
use crate::error::ProcedureError;
use crate::event::{EditKind, StructuralChange};
use crate::graph::{Graph, GraphRegistry};
use crate::ty::Ty;
use crate::unify::TypeTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropagatorState {
    Idle,
    Resolving,
    Propagating,
    RenderRequested,
}

/// What [`ChangePropagator::handle`] did with an event.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The event triggered propagation; these requests were delivered.
    Applied { requests: Vec<EditorRequest> },
    /// The event touched nothing type-relevant.
    Ignored,
    /// The event arrived while a transaction was in flight.
    Discarded,
}

/// A propagation rule selected while resolving an event.
#[derive(Clone, Debug, PartialEq)]
enum Action {
    ReturnPlugged {
        graph: GraphId,
        definition: BlockId,
        subtree: BlockId,
        ty: Option<Ty>,
    },
    ReturnUnplugged {
        graph: GraphId,
        definition: BlockId,
    },
    CallConnection {
        graph: GraphId,
        call: BlockId,
        target: Option<Target>,
    },
    Argument {
        graph: GraphId,
        call: BlockId,
        index: usize,
        child: Option<BlockId>,
    },
    Rename {
        graph: GraphId,
        definition: BlockId,
        new_name: String,
    },
}

/// Decide which rules a structural change triggers.
fn resolve_actions(registry: &GraphRegistry, change: &StructuralChange) -> Vec<Action> {
    let Some(graph) = registry.graph(change.graph) else {
        debug!(graph = %change.graph, "event for unknown graph");
        return Vec::new();
    };
    let mut actions = Vec::new();

    let plugged = match &change.kind {
        EditKind::Rename { new_name } => {
            if graph.definition(change.block).is_some() {
                actions.push(Action::Rename {
                    graph: change.graph,
                    definition: change.block,
                    new_name: new_name.clone(),
                });
            }
            return actions;
        }
        EditKind::Plug => true,
        EditKind::Unplug => false,
    };

    if graph.call_site(change.block).and_then(CallSite::as_value).is_some() {
        let target = match (plugged, change.new_parent) {
            (true, Some(parent)) => Some(Target {
                slot: SlotRef::input(parent, change.input_slot.clone().unwrap_or_default()),
                accepts: change.target_accepts.clone(),
            }),
            _ => None,
        };
        actions.push(Action::CallConnection {
            graph: change.graph,
            call: change.block,
            target,
        });
    }

    let (Some(parent), Some(slot)) = (change.parent(), change.input_slot.as_deref()) else {
        return actions;
    };
    let returns_into = graph
        .definition(parent)
        .and_then(Definition::as_let)
        .is_some();
    if slot == RETURN_SLOT && returns_into {
        if !registry.is_main(change.graph) {
            debug!(
                graph = %change.graph,
                definition = %parent,
                "return slot edit outside the main graph; ignoring"
            );
        } else if plugged {
            actions.push(Action::ReturnPlugged {
                graph: change.graph,
                definition: parent,
                subtree: change.block,
                ty: change.subtree_ty.clone(),
            });
        } else {
            actions.push(Action::ReturnUnplugged {
                graph: change.graph,
                definition: parent,
            });
        }
    } else if let Some(index) = arg_index(slot) {
        if graph.call_site(parent).is_some() {
            actions.push(Action::Argument {
                graph: change.graph,
                call: parent,
                index,
                child: plugged.then_some(change.block),
            });
        }
    }
    actions
}

// ── Transaction ────────────────────────────────────────────────────────

/// One propagation pass: the single writer of the registry while it lives.
pub(crate) struct Pass<'a> {
    pub(crate) registry: &'a mut GraphRegistry,
    pub(crate) config: &'a PropagatorConfig,
    requests: Vec<EditorRequest>,
    saved: FxHashMap<GraphId, Graph>,
}

impl<'a> Pass<'a> {
    fn new(registry: &'a mut GraphRegistry, config: &'a PropagatorConfig) -> Self {
        Pass {
            registry,
            config,
            requests: Vec::new(),
            saved: FxHashMap::default(),
        }
    }

    pub(crate) fn types(&mut self) -> &mut TypeTable {
        &mut self.registry.types
    }

    pub(crate) fn request(&mut self, request: EditorRequest) {
        self.requests.push(request);
    }

    /// Save a graph's nodes before the first mutation so a failed pass can
    /// put them back.
    fn touch(&mut self, id: GraphId) -> Result<(), ProcedureError> {
        if !self.saved.contains_key(&id) {
            let graph = self
                .registry
                .graph(id)
                .ok_or(ProcedureError::UnknownGraph(id))?
                .clone();
            self.saved.insert(id, graph);
        }
        Ok(())
    }

    pub(crate) fn graph_mut(&mut self, id: GraphId) -> Result<&mut Graph, ProcedureError> {
        self.touch(id)?;
        self.registry
            .graph_mut(id)
            .ok_or(ProcedureError::UnknownGraph(id))
    }

    fn apply(&mut self, action: Action) -> Result<(), ProcedureError> {
        match action {
            Action::ReturnPlugged {
                graph,
                definition,
                subtree,
                ty,
            } => {
                let ty = match ty {
                    Some(ty) => ty,
                    None => match self.value_output(graph, subtree) {
                        Some((output, _)) => output,
                        None => self.types().fresh_var(),
                    },
                };
                self.on_return_slot_change(
                    graph,
                    definition,
                    ReturnSlotChange::Plugged { subtree, ty },
                )
            }
            Action::ReturnUnplugged { graph, definition } => {
                self.on_return_slot_change(graph, definition, ReturnSlotChange::Unplugged)
            }
            Action::CallConnection { graph, call, target } => {
                self.on_call_connection_change(graph, call, target)
            }
            Action::Argument {
                graph,
                call,
                index,
                child,
            } => self.on_argument_changed(graph, call, index, child),
            Action::Rename {
                graph,
                definition,
                new_name,
            } => self.rename_definition(graph, definition, &new_name),
        }
    }

    // ── Loading ────────────────────────────────────────────────────────

    /// Rebuild a graph from its persisted shape with fresh variables, then
    /// re-unify every call site once.
    pub(crate) fn load_graph(
        &mut self,
        graph: GraphId,
        persisted: &PersistedGraph,
    ) -> Result<(), ProcedureError> {
        persisted.validate().map_err(ProcedureError::InvalidWorkspace)?;
        *self.graph_mut(graph)? = Graph::new(graph);

        for saved in &persisted.definitions {
            let params = Param::zip(&saved.names(), &saved.argument_ids)?;
            let def = if saved.returning {
                let ret = self.types().fresh_var();
                self.request(EditorRequest::SetSlotType {
                    graph,
                    slot: SlotRef::input(saved.block, RETURN_SLOT),
                    ty: ret.clone(),
                });
                let mut def = LetDefinition::new(saved.block, saved.name.clone(), ret);
                def.params = params;
                Definition::Let(def)
            } else {
                Definition::Void(VoidDefinition {
                    block: saved.block,
                    name: saved.name.clone(),
                    params,
                })
            };
            let g = self.graph_mut(graph)?;
            g.index_mut().register_definition(&saved.name, saved.block);
            g.insert_definition(def);
        }

        let mut calls: Vec<_> = persisted.call_sites.iter().collect();
        calls.sort_by_key(|call| call.block);
        for saved in calls {
            let name = saved.procedure_name.as_str();
            let args = ArgSlot::from_params(&self.main_params(name));
            if !saved.returns_value {
                self.graph_mut(graph)?.insert_call_site(CallSite::Statement(StatementCall {
                    block: saved.block,
                    procedure_name: name.to_string(),
                    args,
                }));
                continue;
            }
            let output = self.definition_return(name);
            if let Some(type_name) = &saved.type_name {
                let hint = Ty::parse(type_name).map_err(|reason| ProcedureError::InvalidTypeName {
                    name: type_name.clone(),
                    reason,
                })?;
                self.types().unify(&output, &hint)?;
            }
            self.graph_mut(graph)?.insert_call_site(CallSite::Value(ValueCall {
                block: saved.block,
                procedure_name: name.to_string(),
                args,
                output: output.clone(),
                connection: Connection::Detached,
            }));
            self.request_retype(graph, saved.block, &output);
        }
        debug!(
            %graph,
            definitions = persisted.definitions.len(),
            call_sites = persisted.call_sites.len(),
            "graph loaded"
        );
        if self.registry.is_main(graph) {
            self.rebind_auxiliary_callers(graph)?;
        }
        Ok(())
    }

    /// Point every auxiliary value call at the freshly loaded main
    /// definitions. A connected call re-applies the type its input accepts;
    /// if that conflicts, the call is detached instead of failing the load.
    fn rebind_auxiliary_callers(&mut self, main: GraphId) -> Result<(), ProcedureError> {
        let offset = self.config.detach_offset;
        for aux in self.registry.graph_ids() {
            if aux == main {
                continue;
            }
            let calls: Vec<(BlockId, String)> = self
                .registry
                .graph(aux)
                .map(|g| {
                    g.call_sites()
                        .into_iter()
                        .filter(|call| call.as_value().is_some())
                        .map(|call| (call.block(), call.procedure_name().to_string()))
                        .collect()
                })
                .unwrap_or_default();
            for (block, name) in calls {
                let def_ty = self.definition_return(&name);
                let Some((_, connection)) = self.value_output(aux, block) else {
                    continue;
                };
                if let Connection::ConnectedTo(Target {
                    accepts: Some(accepts),
                    ..
                }) = &connection
                {
                    if let Err(err) = self.types().unify(&def_ty, accepts) {
                        debug!(%name, call = %block, %err, "stale preview usage; detaching");
                        self.request(EditorRequest::Disconnect { graph: aux, block });
                        self.request(EditorRequest::Reposition {
                            graph: aux,
                            block,
                            dx: offset.dx,
                            dy: offset.dy,
                        });
                        self.value_call_mut(aux, block)?.connection = Connection::Detached;
                    }
                }
                self.value_call_mut(aux, block)?.output = def_ty.clone();
                self.request_retype(aux, block, &def_ty);
            }
        }
        Ok(())
    }
}

// ── Propagator ─────────────────────────────────────────────────────────

/// Drives propagation passes and guards against re-entrant events.
pub struct ChangePropagator {
    config: PropagatorConfig,
    state: PropagatorState,
    under_mutation: Option<BlockId>,
    discarded: usize,
}

impl ChangePropagator {
    pub fn new(config: PropagatorConfig) -> Self {
        ChangePropagator {
            config,
            state: PropagatorState::Idle,
            under_mutation: None,
            discarded: 0,
        }
    }

    pub fn config(&self) -> &PropagatorConfig {
        &self.config
    }

    pub fn state(&self) -> PropagatorState {
        self.state
    }

    /// Number of re-entrant events dropped so far.
    pub fn discarded_events(&self) -> usize {
        self.discarded
    }

    /// Handle one structural change fired by the editor.
    ///
    /// On error the change is rejected: every binding and node is restored
    /// and the editor receives no requests. Undoing the edit itself is left
    /// to the host.
    pub fn handle(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        change: &StructuralChange,
    ) -> Result<Outcome, ProcedureError> {
        if self.state != PropagatorState::Idle {
            self.discard(change);
            return Ok(Outcome::Discarded);
        }
        self.state = PropagatorState::Resolving;
        let actions = resolve_actions(registry, change);
        if actions.is_empty() {
            trace!(block = %change.block, kind = ?change.kind, "event is not type-relevant");
            self.state = PropagatorState::Idle;
            return Ok(Outcome::Ignored);
        }
        let ((), requests) = self.transact(registry, editor, Some(change.block), |pass| {
            actions.into_iter().try_for_each(|action| pass.apply(action))
        })?;
        Ok(Outcome::Applied { requests })
    }

    /// Register a new definition block. Returns the name it was given, which
    /// differs from `name` when that name is already taken in `graph`.
    pub fn create_definition(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        graph: GraphId,
        block: BlockId,
        name: &str,
        kind: DefinitionKind,
    ) -> Result<String, ProcedureError> {
        self.transact(registry, editor, Some(block), |pass| {
            pass.create_definition(graph, block, name, kind, Vec::new())
        })
        .map(|(name, _)| name)
    }

    pub fn create_call_site(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        graph: GraphId,
        block: BlockId,
        name: &str,
        kind: CallKind,
    ) -> Result<(), ProcedureError> {
        self.transact(registry, editor, Some(block), |pass| {
            pass.create_call_site(graph, block, name, kind)
        })
        .map(|_| ())
    }

    /// Spawn a new reference block from a value call, sharing its type. The
    /// new block lands in the main graph.
    pub fn spawn_reference(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        graph: GraphId,
        source: BlockId,
        block: BlockId,
    ) -> Result<(), ProcedureError> {
        self.transact(registry, editor, Some(block), |pass| {
            pass.spawn_reference(graph, source, block)
        })
        .map(|_| ())
    }

    /// Delete a definition or call site block.
    pub fn delete_block(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        graph: GraphId,
        block: BlockId,
    ) -> Result<(), ProcedureError> {
        self.transact(registry, editor, Some(block), |pass| {
            let g = pass
                .registry
                .graph(graph)
                .ok_or(ProcedureError::UnknownGraph(graph))?;
            if g.definition(block).is_some() {
                pass.delete_definition(graph, block)
            } else {
                pass.delete_call_site(graph, block)
            }
        })
        .map(|_| ())
    }

    /// Replace a definition's parameters and reshape its call sites.
    pub fn set_definition_params(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        graph: GraphId,
        block: BlockId,
        names: &[String],
        ids: &[ParamId],
    ) -> Result<(), ProcedureError> {
        self.transact(registry, editor, Some(block), |pass| {
            pass.set_definition_params(graph, block, names, ids)
        })
        .map(|_| ())
    }

    /// Rebuild one call site's argument inputs.
    pub fn on_parameter_shape_change(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        graph: GraphId,
        call: BlockId,
        names: &[String],
        ids: &[ParamId],
    ) -> Result<(), ProcedureError> {
        self.transact(registry, editor, Some(call), |pass| {
            pass.on_parameter_shape_change(graph, call, names, ids)
        })
        .map(|_| ())
    }

    /// Re-unify a call site with its main definition.
    pub fn refresh_call_type(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        graph: GraphId,
        call: BlockId,
    ) -> Result<(), ProcedureError> {
        self.transact(registry, editor, Some(call), |pass| pass.refresh_call_type(graph, call))
            .map(|_| ())
    }

    /// Replace `graph` with a persisted graph. A conflict leaves the previous
    /// contents in place.
    pub fn load_graph(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        graph: GraphId,
        persisted: &PersistedGraph,
    ) -> Result<(), ProcedureError> {
        self.transact(registry, editor, None, |pass| pass.load_graph(graph, persisted))
            .map(|_| ())
    }

    fn transact<T>(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        subject: Option<BlockId>,
        rules: impl FnOnce(&mut Pass<'_>) -> Result<T, ProcedureError>,
    ) -> Result<(T, Vec<EditorRequest>), ProcedureError> {
        self.state = PropagatorState::Propagating;
        self.under_mutation = subject;
        let snapshot = registry.types.snapshot();

        let mut pass = Pass::new(registry, &self.config);
        let result = rules(&mut pass);
        let Pass { requests, saved, .. } = pass;

        match result {
            Ok(value) => {
                registry.types.commit(snapshot);
                self.state = PropagatorState::RenderRequested;
                self.flush(registry, editor, &requests);
                self.state = PropagatorState::Idle;
                self.under_mutation = None;
                Ok((value, requests))
            }
            Err(err) => {
                for (_, graph) in saved {
                    registry.replace_graph(graph);
                }
                registry.types.rollback_to(snapshot);
                if err.is_rejected_edit() {
                    warn!(block = ?subject, %err, "edit rejected; bindings restored");
                } else {
                    error!(block = ?subject, %err, "propagation aborted; bindings restored");
                }
                self.state = PropagatorState::Idle;
                self.under_mutation = None;
                Err(err)
            }
        }
    }

    fn flush(
        &mut self,
        registry: &mut GraphRegistry,
        editor: &mut dyn GraphEditor,
        requests: &[EditorRequest],
    ) {
        for request in requests {
            let graph = request.graph();
            if !editor.contains_block(graph, request.block()) {
                trace!(
                    %graph,
                    block = %request.block(),
                    "skipping request for a block the editor does not hold"
                );
                continue;
            }
            for echo in request.clone().apply(editor, &mut registry.types) {
                self.discard(&echo);
            }
        }
    }

    fn discard(&mut self, change: &StructuralChange) {
        self.discarded += 1;
        if Some(change.block) == self.under_mutation {
            trace!(
                block = %change.block,
                state = ?self.state,
                "discarding echo of the block under mutation"
            );
        } else {
            trace!(block = %change.block, state = ?self.state, "discarding re-entrant event");
        }
    }
}

impl Default for ChangePropagator {
    fn default() -> Self {
        Self::new(PropagatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_foo() -> GraphRegistry {
        let mut registry = GraphRegistry::new();
        let ret = registry.types.fresh_var();
        let main = registry.main_graph();
        let graph = registry.graph_mut(main).unwrap();
        graph.index_mut().register_definition("foo", BlockId(1));
        graph.insert_definition(
            Definition::Let(LetDefinition::new(BlockId(1), "foo", ret.clone())),
        );
        graph.insert_call_site(CallSite::Value(ValueCall {
            block: BlockId(2),
            procedure_name: "foo".into(),
            args: vec![],
            output: ret,
            connection: Connection::Detached,
        }));
        registry
    }

    #[test]
    fn plug_into_return_slot_resolves_to_return_rule() {
        let registry = registry_with_foo();
        let change = StructuralChange::plug(GraphId(0), BlockId(9), BlockId(1), RETURN_SLOT)
            .with_subtree_ty(Ty::number());
        assert_eq!(
            resolve_actions(&registry, &change),
            vec![Action::ReturnPlugged {
                graph: GraphId(0),
                definition: BlockId(1),
                subtree: BlockId(9),
                ty: Some(Ty::number()),
            }]
        );
    }

    #[test]
    fn call_plugged_into_return_slot_triggers_both_rules() {
        let registry = registry_with_foo();
        let change = StructuralChange::plug(GraphId(0), BlockId(2), BlockId(1), RETURN_SLOT);
        let actions = resolve_actions(&registry, &change);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::CallConnection { call: BlockId(2), .. }));
        assert!(matches!(actions[1], Action::ReturnPlugged { subtree: BlockId(2), ty: None, .. }));
    }

    #[test]
    fn argument_edits_resolve_to_argument_rule() {
        let registry = registry_with_foo();
        let change = StructuralChange::unplug(GraphId(0), BlockId(5), BlockId(2), "ARG1");
        assert_eq!(
            resolve_actions(&registry, &change),
            vec![Action::Argument {
                graph: GraphId(0),
                call: BlockId(2),
                index: 1,
                child: None,
            }]
        );
    }

    #[test]
    fn unrelated_edits_resolve_to_nothing() {
        let registry = registry_with_foo();
        let change = StructuralChange::plug(GraphId(0), BlockId(7), BlockId(8), "VALUE");
        assert!(resolve_actions(&registry, &change).is_empty());
        let rename = StructuralChange::rename(GraphId(0), BlockId(2), "bar");
        assert!(resolve_actions(&registry, &rename).is_empty());
        let unknown = StructuralChange::plug(GraphId(4), BlockId(2), BlockId(1), RETURN_SLOT);
        assert!(resolve_actions(&registry, &unknown).is_empty());
    }
}
