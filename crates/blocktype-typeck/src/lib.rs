//! blocktype type core: return-type inference for let-procedures in a block
//! editor.
//!
//! A let-procedure's return type starts as a fresh type variable shared by
//! the definition and all of its call sites. Structural edits in the editor
//! narrow, reset or rebind that variable, and the change propagator keeps
//! every call site consistent with the definition in the main graph.
//!
//! # Architecture
//!
//! - [`ty`]: Type expressions (Ty, TyCon, TyVar)
//! - [`unify`]: Shared binding table with atomic unification and snapshots
//! - [`definition`]: Definition nodes and the return-slot rules
//! - [`call_site`]: Call site nodes, connection state and argument reshaping
//! - [`index`]: Per-graph procedure name index
//! - [`graph`]: Graph instances and the registry that owns them
//! - [`propagate`]: The change propagator and its transactions
//! - [`editor`]: The graph editor boundary
//! - [`memory`]: Headless in-memory editor
//! - [`config`]: TOML configuration
//! - [`error`]: Type and propagation errors

pub mod call_site;
pub mod config;
pub mod definition;
pub mod editor;
pub mod error;
pub mod event;
pub mod graph;
pub mod index;
pub mod memory;
pub mod propagate;
pub mod ty;
pub mod unify;

pub use call_site::{CallKind, CallSite, Connection, Resolution, Target, TypedProcedureCall};
pub use config::PropagatorConfig;
pub use definition::{Definition, DefinitionKind, TypedProcedureDefinition};
pub use editor::{EditorRequest, GraphEditor};
pub use error::{ProcedureError, TypeError};
pub use event::{EditKind, StructuralChange};
pub use graph::{Graph, GraphRegistry};
pub use memory::MemoryEditor;
pub use propagate::{ChangePropagator, Outcome, PropagatorState};
pub use ty::Ty;
