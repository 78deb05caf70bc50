//! Procedure call nodes.
//!
//! A call site refers to its definition by name only. Every type refresh
//! looks the name up again in the main graph's index, so renames and
//! deletions never leave a stale definition pointer behind.

use tracing::debug;

use blocktype_common::{BlockId, GraphId, ParamId, SlotRef};

use crate::definition::{Param, TypedProcedureDefinition};
use crate::editor::EditorRequest;
use crate::error::ProcedureError;
use crate::propagate::Pass;
use crate::ty::Ty;

/// The downstream input a value call is plugged into.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub slot: SlotRef,
    /// Type the input accepts. `None` accepts any type.
    pub accepts: Option<Ty>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum Connection {
    #[default]
    Detached,
    ConnectedTo(Target),
}

/// One argument input of a call block.
#[derive(Clone, Debug, PartialEq)]
pub struct ArgSlot {
    pub param: ParamId,
    pub name: String,
    /// Block plugged into this argument, if any.
    pub child: Option<BlockId>,
}

impl ArgSlot {
    pub(crate) fn from_params(params: &[Param]) -> Vec<ArgSlot> {
        params
            .iter()
            .map(|p| ArgSlot {
                param: p.id.clone(),
                name: p.name.clone(),
                child: None,
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// Produces a value through its output connection.
    Value,
    /// Sits in a statement stack; has no output type.
    Statement,
}

/// Read access shared by every kind of call block.
pub trait TypedProcedureCall {
    fn procedure_name(&self) -> &str;

    fn args(&self) -> &[ArgSlot];

    /// Output type expression; `None` for statement calls.
    fn output_ty(&self) -> Option<&Ty>;

    /// The downstream input this call feeds, if connected.
    fn target(&self) -> Option<&Target>;
}

#[derive(Clone, Debug)]
pub struct ValueCall {
    pub block: BlockId,
    pub procedure_name: String,
    pub args: Vec<ArgSlot>,
    pub output: Ty,
    pub connection: Connection,
}

#[derive(Clone, Debug)]
pub struct StatementCall {
    pub block: BlockId,
    pub procedure_name: String,
    pub args: Vec<ArgSlot>,
}

impl TypedProcedureCall for ValueCall {
    fn procedure_name(&self) -> &str {
        &self.procedure_name
    }

    fn args(&self) -> &[ArgSlot] {
        &self.args
    }

    fn output_ty(&self) -> Option<&Ty> {
        Some(&self.output)
    }

    fn target(&self) -> Option<&Target> {
        match &self.connection {
            Connection::ConnectedTo(target) => Some(target),
            Connection::Detached => None,
        }
    }
}

impl TypedProcedureCall for StatementCall {
    fn procedure_name(&self) -> &str {
        &self.procedure_name
    }

    fn args(&self) -> &[ArgSlot] {
        &self.args
    }

    fn output_ty(&self) -> Option<&Ty> {
        None
    }

    fn target(&self) -> Option<&Target> {
        None
    }
}

#[derive(Clone, Debug)]
pub enum CallSite {
    Value(ValueCall),
    Statement(StatementCall),
}

impl CallSite {
    pub fn block(&self) -> BlockId {
        match self {
            CallSite::Value(call) => call.block,
            CallSite::Statement(call) => call.block,
        }
    }

    pub fn kind(&self) -> CallKind {
        match self {
            CallSite::Value(_) => CallKind::Value,
            CallSite::Statement(_) => CallKind::Statement,
        }
    }

    pub fn as_value(&self) -> Option<&ValueCall> {
        match self {
            CallSite::Value(call) => Some(call),
            CallSite::Statement(_) => None,
        }
    }

    pub(crate) fn as_value_mut(&mut self) -> Option<&mut ValueCall> {
        match self {
            CallSite::Value(call) => Some(call),
            CallSite::Statement(_) => None,
        }
    }

    pub(crate) fn set_procedure_name(&mut self, name: &str) {
        match self {
            CallSite::Value(call) => call.procedure_name = name.to_string(),
            CallSite::Statement(call) => call.procedure_name = name.to_string(),
        }
    }

    fn args_mut(&mut self) -> &mut Vec<ArgSlot> {
        match self {
            CallSite::Value(call) => &mut call.args,
            CallSite::Statement(call) => &mut call.args,
        }
    }
}

impl TypedProcedureCall for CallSite {
    fn procedure_name(&self) -> &str {
        match self {
            CallSite::Value(call) => call.procedure_name(),
            CallSite::Statement(call) => call.procedure_name(),
        }
    }

    fn args(&self) -> &[ArgSlot] {
        match self {
            CallSite::Value(call) => call.args(),
            CallSite::Statement(call) => call.args(),
        }
    }

    fn output_ty(&self) -> Option<&Ty> {
        match self {
            CallSite::Value(call) => call.output_ty(),
            CallSite::Statement(call) => call.output_ty(),
        }
    }

    fn target(&self) -> Option<&Target> {
        match self {
            CallSite::Value(call) => call.target(),
            CallSite::Statement(call) => call.target(),
        }
    }
}

/// Outcome of looking a procedure name up in the main graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved { graph: GraphId, block: BlockId },
    /// No live definition; the call site stays polymorphic.
    Dangling,
}

/// Argument index encoded in an argument input name (`ARG0`, `ARG1`, ...).
pub fn arg_index(slot: &str) -> Option<usize> {
    slot.strip_prefix("ARG")?.parse().ok()
}

// ── Propagation rules ──────────────────────────────────────────────────

impl Pass<'_> {
    pub(crate) fn value_call_mut(
        &mut self,
        graph: GraphId,
        block: BlockId,
    ) -> Result<&mut ValueCall, ProcedureError> {
        self.graph_mut(graph)?
            .call_site_mut(block)
            .and_then(CallSite::as_value_mut)
            .ok_or(ProcedureError::UnknownBlock { graph, block })
    }

    /// Output type and connection of a value call; `None` for statement calls.
    pub(crate) fn value_output(&self, graph: GraphId, block: BlockId) -> Option<(Ty, Connection)> {
        let call = self.registry.graph(graph)?.call_site(block)?.as_value()?;
        Some((call.output.clone(), call.connection.clone()))
    }

    /// The main definition's return type, or a fresh variable when the name
    /// has no returning definition yet.
    pub(crate) fn definition_return(&mut self, name: &str) -> Ty {
        let ret = self
            .registry
            .main_definition(name)
            .and_then(|def| def.return_ty())
            .cloned();
        match ret {
            Some(ty) => ty,
            None => {
                debug!(%name, "no returning definition; call site stays polymorphic");
                self.types().fresh_var()
            }
        }
    }

    pub(crate) fn main_params(&self, name: &str) -> Vec<Param> {
        self.registry
            .main_definition(name)
            .map(|def| def.params().to_vec())
            .unwrap_or_default()
    }

    /// Push a call site's new output type to the editor.
    pub(crate) fn request_retype(&mut self, graph: GraphId, block: BlockId, ty: &Ty) {
        self.request(EditorRequest::SetSlotType {
            graph,
            slot: SlotRef::output(block),
            ty: ty.clone(),
        });
        self.request(EditorRequest::RecolorByType {
            graph,
            block,
            ty: ty.clone(),
        });
        self.request(EditorRequest::Render { graph, block });
    }

    pub(crate) fn create_call_site(
        &mut self,
        graph: GraphId,
        block: BlockId,
        name: &str,
        kind: CallKind,
    ) -> Result<(), ProcedureError> {
        let args = ArgSlot::from_params(&self.main_params(name));
        let call = match kind {
            CallKind::Value => {
                let output = self.definition_return(name);
                self.request_retype(graph, block, &output);
                CallSite::Value(ValueCall {
                    block,
                    procedure_name: name.to_string(),
                    args,
                    output,
                    connection: Connection::Detached,
                })
            }
            CallKind::Statement => {
                self.request(EditorRequest::Render { graph, block });
                CallSite::Statement(StatementCall {
                    block,
                    procedure_name: name.to_string(),
                    args,
                })
            }
        };
        self.graph_mut(graph)?.insert_call_site(call);
        debug!(%graph, %block, %name, "call site created");
        Ok(())
    }

    /// Duplicate a value call into the main graph. The copy shares the
    /// source's output type expression.
    pub(crate) fn spawn_reference(
        &mut self,
        graph: GraphId,
        source: BlockId,
        block: BlockId,
    ) -> Result<(), ProcedureError> {
        let call = self
            .registry
            .graph(graph)
            .ok_or(ProcedureError::UnknownGraph(graph))?
            .call_site(source)
            .and_then(CallSite::as_value)
            .ok_or(ProcedureError::UnknownBlock {
                graph,
                block: source,
            })?;
        let copy = ValueCall {
            block,
            procedure_name: call.procedure_name.clone(),
            args: call
                .args
                .iter()
                .map(|arg| ArgSlot {
                    child: None,
                    ..arg.clone()
                })
                .collect(),
            output: call.output.clone(),
            connection: Connection::Detached,
        };
        let main = self.registry.main_graph();
        let output = copy.output.clone();
        self.graph_mut(main)?.insert_call_site(CallSite::Value(copy));
        self.request_retype(main, block, &output);
        Ok(())
    }

    pub(crate) fn delete_call_site(
        &mut self,
        graph: GraphId,
        block: BlockId,
    ) -> Result<(), ProcedureError> {
        self.graph_mut(graph)?
            .remove_call_site(block)
            .ok_or(ProcedureError::UnknownBlock { graph, block })?;
        debug!(%graph, %block, "call site deleted");
        Ok(())
    }

    /// Unify the main definition's return type into a value call's output.
    pub(crate) fn refresh_call_type(
        &mut self,
        graph: GraphId,
        block: BlockId,
    ) -> Result<(), ProcedureError> {
        let Some((output, _)) = self.value_output(graph, block) else {
            return Ok(());
        };
        let name = self
            .registry
            .graph(graph)
            .and_then(|g| g.call_site(block))
            .map(|call| call.procedure_name().to_string())
            .ok_or(ProcedureError::UnknownBlock { graph, block })?;
        let def_ty = self.definition_return(&name);
        self.types().unify(&output, &def_ty)?;
        self.value_call_mut(graph, block)?.output = def_ty.clone();
        self.request_retype(graph, block, &def_ty);
        Ok(())
    }

    /// A value call was plugged into `target`, or unplugged when `target` is
    /// `None`. The output is re-unified with the definition before render.
    pub(crate) fn on_call_connection_change(
        &mut self,
        graph: GraphId,
        block: BlockId,
        target: Option<Target>,
    ) -> Result<(), ProcedureError> {
        self.refresh_call_type(graph, block)?;
        if let Some(Target {
            accepts: Some(accepts),
            ..
        }) = &target
        {
            let (output, _) = self
                .value_output(graph, block)
                .ok_or(ProcedureError::UnknownBlock { graph, block })?;
            self.types().unify(&output, accepts)?;
        }
        self.value_call_mut(graph, block)?.connection = match target {
            Some(target) => Connection::ConnectedTo(target),
            None => Connection::Detached,
        };
        Ok(())
    }

    /// A block was plugged into or unplugged from one of the call's argument
    /// inputs.
    pub(crate) fn on_argument_changed(
        &mut self,
        graph: GraphId,
        call: BlockId,
        index: usize,
        child: Option<BlockId>,
    ) -> Result<(), ProcedureError> {
        let site = self
            .graph_mut(graph)?
            .call_site_mut(call)
            .ok_or(ProcedureError::UnknownBlock { graph, block: call })?;
        match site.args_mut().get_mut(index) {
            Some(arg) => arg.child = child,
            None => debug!(%call, index, "argument input out of range"),
        }
        Ok(())
    }

    /// Rebuild a call's argument inputs for a new parameter list.
    ///
    /// Subtrees follow their parameter id. A removed id's subtree is
    /// detached and its neighbours are bumped; a new id gets an empty input.
    pub(crate) fn on_parameter_shape_change(
        &mut self,
        graph: GraphId,
        call: BlockId,
        names: &[String],
        ids: &[ParamId],
    ) -> Result<(), ProcedureError> {
        let params = Param::zip(names, ids)?;
        self.refresh_call_type(graph, call)?;

        let site = self
            .graph_mut(graph)?
            .call_site_mut(call)
            .ok_or(ProcedureError::UnknownBlock { graph, block: call })?;
        let old = std::mem::take(site.args_mut());
        let same_names = old.len() == params.len()
            && old.iter().zip(&params).all(|(arg, p)| arg.name == p.name);
        if same_names {
            *site.args_mut() = old
                .into_iter()
                .zip(params)
                .map(|(arg, p)| ArgSlot { param: p.id, ..arg })
                .collect();
            return Ok(());
        }

        let new: Vec<ArgSlot> = params
            .into_iter()
            .map(|p| ArgSlot {
                child: old
                    .iter()
                    .find(|arg| arg.param == p.id)
                    .and_then(|arg| arg.child),
                param: p.id,
                name: p.name,
            })
            .collect();
        *site.args_mut() = new.clone();

        for arg in &old {
            let kept = new.iter().any(|n| n.param == arg.param);
            if let (false, Some(child)) = (kept, arg.child) {
                debug!(%call, param = %arg.param, "parameter removed; detaching argument");
                self.request(EditorRequest::Disconnect { graph, block: child });
                self.request(EditorRequest::BumpNeighbours { graph, block: child });
            }
        }
        self.request(EditorRequest::UpdateShape {
            graph,
            block: call,
            arg_names: new.iter().map(|arg| arg.name.clone()).collect(),
        });
        for (i, arg) in new.iter().enumerate() {
            if let Some(child) = arg.child {
                self.request(EditorRequest::Connect {
                    graph,
                    block: child,
                    target: SlotRef::arg(call, i),
                });
            }
        }
        self.request(EditorRequest::Render { graph, block: call });
        Ok(())
    }
}
