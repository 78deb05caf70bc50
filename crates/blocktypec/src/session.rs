//! A headless editing session: registry, propagator and in-memory editor
//! wired together the way a block editor host wires them.

use std::fmt;

use serde::{Deserialize, Serialize};

use blocktype_common::{BlockId, GraphId, ParamId, PersistedGraph, SlotRef, RETURN_SLOT};
use blocktype_typeck::{
    CallKind, ChangePropagator, DefinitionKind, GraphEditor, GraphRegistry, MemoryEditor,
    ProcedureError, PropagatorConfig, StructuralChange, Ty, TypedProcedureCall,
    TypedProcedureDefinition,
};

fn yes() -> bool {
    true
}

/// One scripted user edit. All edits act on the main graph.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    CreateDefinition {
        block: BlockId,
        name: String,
        #[serde(default = "yes")]
        returning: bool,
        /// Parameter names; each doubles as its parameter id.
        #[serde(default)]
        args: Vec<String>,
    },
    CreateCall {
        block: BlockId,
        name: String,
        #[serde(default = "yes")]
        value: bool,
    },
    /// Plug a call (or any block) into an input of another block.
    Connect {
        block: BlockId,
        target: BlockId,
        slot: String,
        /// Type the target input accepts.
        #[serde(default)]
        accepts: Option<String>,
    },
    Disconnect {
        block: BlockId,
    },
    /// Plug an expression into a definition's return input. A missing block
    /// is created as a literal of type `ty`.
    PlugReturn {
        definition: BlockId,
        block: BlockId,
        #[serde(default)]
        ty: Option<String>,
    },
    UnplugReturn {
        definition: BlockId,
    },
    Rename {
        block: BlockId,
        name: String,
    },
    SetParams {
        block: BlockId,
        names: Vec<String>,
        ids: Vec<String>,
    },
    Delete {
        block: BlockId,
    },
    SpawnReference {
        source: BlockId,
        block: BlockId,
    },
}

impl EditOp {
    pub fn name(&self) -> &'static str {
        match self {
            EditOp::CreateDefinition { .. } => "create_definition",
            EditOp::CreateCall { .. } => "create_call",
            EditOp::Connect { .. } => "connect",
            EditOp::Disconnect { .. } => "disconnect",
            EditOp::PlugReturn { .. } => "plug_return",
            EditOp::UnplugReturn { .. } => "unplug_return",
            EditOp::Rename { .. } => "rename",
            EditOp::SetParams { .. } => "set_params",
            EditOp::Delete { .. } => "delete",
            EditOp::SpawnReference { .. } => "spawn_reference",
        }
    }
}

/// Parse an edit script: a JSON array of edits.
pub fn parse_script(content: &str) -> Result<Vec<EditOp>, String> {
    serde_json::from_str(content).map_err(|e| format!("Failed to parse script: {}", e))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionLine {
    pub block: BlockId,
    pub name: String,
    /// `None` for void procedures.
    #[serde(rename = "type")]
    pub ty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallLine {
    pub block: BlockId,
    pub name: String,
    /// `None` for statement calls.
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub connected_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub step: usize,
    pub op: String,
    pub error: String,
}

/// Final types of every procedure block in the main graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub definitions: Vec<DefinitionLine>,
    pub calls: Vec<CallLine>,
    pub rejected: Vec<Rejection>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for def in &self.definitions {
            match &def.ty {
                Some(ty) => writeln!(f, "def {} : {}", def.name, ty)?,
                None => writeln!(f, "def {}", def.name)?,
            }
        }
        for call in &self.calls {
            write!(f, "call {} {}", call.block, call.name)?;
            if let Some(ty) = &call.ty {
                write!(f, " : {}", ty)?;
            }
            if let Some(target) = &call.connected_to {
                write!(f, " -> {}", target)?;
            }
            writeln!(f)?;
        }
        for rejection in &self.rejected {
            writeln!(
                f,
                "rejected step {} ({}): {}",
                rejection.step, rejection.op, rejection.error
            )?;
        }
        Ok(())
    }
}

pub struct Session {
    registry: GraphRegistry,
    propagator: ChangePropagator,
    editor: MemoryEditor,
    rejected: Vec<Rejection>,
}

impl Session {
    pub fn new(config: PropagatorConfig) -> Self {
        Session {
            registry: GraphRegistry::new(),
            editor: MemoryEditor::new(config.clone()),
            propagator: ChangePropagator::new(config),
            rejected: Vec::new(),
        }
    }

    fn main(&self) -> GraphId {
        self.registry.main_graph()
    }

    /// Load a saved workspace into the main graph.
    pub fn load(&mut self, persisted: &PersistedGraph) -> Result<(), ProcedureError> {
        let main = self.main();
        for def in &persisted.definitions {
            self.editor.add_procedure_block(main, def.block, &def.name);
        }
        for call in &persisted.call_sites {
            self.editor
                .add_procedure_block(main, call.block, &call.procedure_name);
        }
        self.propagator
            .load_graph(&mut self.registry, &mut self.editor, main, persisted)
    }

    /// Apply every edit in order. Rejected edits are undone and recorded;
    /// the replay carries on with the next edit.
    pub fn replay(&mut self, script: &[EditOp]) {
        for (i, op) in script.iter().enumerate() {
            if let Err(err) = self.apply(op) {
                tracing::info!(step = i + 1, op = op.name(), %err, "edit rejected");
                self.rejected.push(Rejection {
                    step: i + 1,
                    op: op.name().to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    pub fn apply(&mut self, op: &EditOp) -> Result<(), ProcedureError> {
        let main = self.main();
        match op {
            EditOp::CreateDefinition {
                block,
                name,
                returning,
                args,
            } => {
                let kind = if *returning {
                    DefinitionKind::Let
                } else {
                    DefinitionKind::Void
                };
                self.editor.add_procedure_block(main, *block, name);
                let assigned = self
                    .propagator
                    .create_definition(
                        &mut self.registry,
                        &mut self.editor,
                        main,
                        *block,
                        name,
                        kind,
                    )
                    .inspect_err(|_| {
                        self.editor.remove_block(main, *block);
                    })?;
                self.editor.set_procedure_name(main, *block, &assigned);
                if !args.is_empty() {
                    let ids: Vec<ParamId> = args.iter().map(ParamId::new).collect();
                    self.propagator.set_definition_params(
                        &mut self.registry,
                        &mut self.editor,
                        main,
                        *block,
                        args,
                        &ids,
                    )?;
                }
                Ok(())
            }
            EditOp::CreateCall { block, name, value } => {
                let kind = if *value {
                    CallKind::Value
                } else {
                    CallKind::Statement
                };
                self.editor.add_procedure_block(main, *block, name);
                self.propagator
                    .create_call_site(
                        &mut self.registry,
                        &mut self.editor,
                        main,
                        *block,
                        name,
                        kind,
                    )
                    .inspect_err(|_| {
                        self.editor.remove_block(main, *block);
                    })
            }
            EditOp::Connect {
                block,
                target,
                slot,
                accepts,
            } => {
                if !self.editor.contains_block(main, *target) {
                    self.editor.add_block(main, *target);
                }
                let slot = SlotRef::input(*target, slot.clone());
                if let Some(name) = accepts {
                    let ty = parse_ty(name)?;
                    self.editor.set_check(main, &slot, ty);
                }
                if let Some(change) = self.editor.unplug(main, *block) {
                    self.dispatch(change, None)?;
                }
                let change = self.editor.plug(main, *block, &slot);
                self.dispatch(change, None)
            }
            EditOp::Disconnect { block } => match self.editor.unplug(main, *block) {
                Some(change) => self.dispatch(change, None),
                None => Ok(()),
            },
            EditOp::PlugReturn {
                definition,
                block,
                ty,
            } => {
                let ty = ty.as_deref().map(parse_ty).transpose()?;
                match self.editor.block_mut(main, *block) {
                    Some(existing) => {
                        if ty.is_some() {
                            existing.output = ty;
                        }
                    }
                    None => {
                        self.editor.add_block(main, *block).output = ty;
                    }
                }
                let slot = SlotRef::input(*definition, RETURN_SLOT);
                if let Some(body) = self.editor.child_at(main, &slot) {
                    if let Some(change) = self.editor.unplug(main, body) {
                        self.dispatch(change, None)?;
                    }
                }
                let change = self.editor.plug(main, *block, &slot);
                self.dispatch(change, None)
            }
            EditOp::UnplugReturn { definition } => {
                let slot = SlotRef::input(*definition, RETURN_SLOT);
                let change = self
                    .editor
                    .child_at(main, &slot)
                    .and_then(|body| self.editor.unplug(main, body))
                    .ok_or(ProcedureError::UnknownBlock {
                        graph: main,
                        block: *definition,
                    })?;
                self.dispatch(change, None)
            }
            EditOp::Rename { block, name } => {
                let old = self
                    .editor
                    .block(main, *block)
                    .and_then(|b| b.procedure_name.clone());
                let change = self.editor.rename(main, *block, name);
                self.dispatch(change, old.as_deref())
            }
            EditOp::SetParams { block, names, ids } => {
                let ids: Vec<ParamId> = ids.iter().map(ParamId::new).collect();
                self.propagator.set_definition_params(
                    &mut self.registry,
                    &mut self.editor,
                    main,
                    *block,
                    names,
                    &ids,
                )
            }
            EditOp::Delete { block } => {
                self.propagator
                    .delete_block(&mut self.registry, &mut self.editor, main, *block)?;
                self.editor.remove_block(main, *block);
                Ok(())
            }
            EditOp::SpawnReference { source, block } => {
                let name = self
                    .registry
                    .graph(main)
                    .and_then(|g| g.call_site(*source))
                    .map(|call| call.procedure_name().to_string())
                    .ok_or(ProcedureError::UnknownBlock {
                        graph: main,
                        block: *source,
                    })?;
                self.editor.add_procedure_block(main, *block, &name);
                self.propagator
                    .spawn_reference(&mut self.registry, &mut self.editor, main, *source, *block)
                    .inspect_err(|_| {
                        self.editor.remove_block(main, *block);
                    })
            }
        }
    }

    fn dispatch(
        &mut self,
        change: StructuralChange,
        old_name: Option<&str>,
    ) -> Result<(), ProcedureError> {
        match self
            .propagator
            .handle(&mut self.registry, &mut self.editor, &change)
        {
            Ok(_) => Ok(()),
            Err(err) => {
                self.editor.undo(&change, old_name);
                Err(err)
            }
        }
    }

    pub fn report(&mut self) -> Report {
        let main = self.main();
        let Some(graph) = self.registry.graph(main) else {
            return Report::default();
        };
        let definitions: Vec<(BlockId, String, bool)> = graph
            .definitions()
            .into_iter()
            .map(|def| (def.block(), def.name().to_string(), def.is_returning()))
            .collect();
        let calls: Vec<(BlockId, String, Option<String>)> = graph
            .call_sites()
            .into_iter()
            .map(|call| {
                let target = call.target().map(|t| t.slot.to_string());
                (call.block(), call.procedure_name().to_string(), target)
            })
            .collect();

        let definitions = definitions
            .into_iter()
            .map(|(block, name, returning)| DefinitionLine {
                ty: returning
                    .then(|| self.registry.return_type(main, block))
                    .flatten()
                    .map(|ty| ty.to_string()),
                block,
                name,
            })
            .collect();
        let calls = calls
            .into_iter()
            .map(|(block, name, connected_to)| CallLine {
                ty: self.registry.output_type(main, block).map(|ty| ty.to_string()),
                block,
                name,
                connected_to,
            })
            .collect();
        Report {
            definitions,
            calls,
            rejected: self.rejected.clone(),
        }
    }
}

fn parse_ty(name: &str) -> Result<Ty, ProcedureError> {
    Ty::parse(name).map_err(|reason| ProcedureError::InvalidTypeName {
        name: name.to_string(),
        reason,
    })
}
