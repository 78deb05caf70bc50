//! Error types for unification and procedure propagation.
//!
//! `TypeError` is the conflict family produced by the unification table.
//! `ProcedureError` is what a propagation transaction reports to its host;
//! every variant except `LengthMismatch` corresponds to a rejected user edit.

use std::fmt;

use blocktype_common::{BlockId, GraphId, PersistError};

use crate::ty::{Ty, TyVar};

/// Two type expressions cannot be made equal.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeError {
    /// Two concrete types with different constructors.
    Mismatch { expected: Ty, found: Ty },
    /// The same constructor applied to a different number of arguments.
    ArityMismatch {
        con: String,
        expected: usize,
        found: usize,
    },
    /// A variable would have to contain itself, e.g. `?0 ~ List<?0>`.
    InfiniteType { var: TyVar, ty: Ty },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Mismatch { expected, found } => {
                write!(f, "expected `{}`, found `{}`", expected, found)
            }
            TypeError::ArityMismatch { con, expected, found } => write!(
                f,
                "`{}` expects {} type argument(s), found {}",
                con, expected, found
            ),
            TypeError::InfiniteType { var, ty } => write!(
                f,
                "infinite type: `?{}` occurs in `{}`",
                var.0, ty
            ),
        }
    }
}

impl std::error::Error for TypeError {}

/// Failure of a propagation transaction.
#[derive(Clone, Debug, PartialEq)]
pub enum ProcedureError {
    /// Unification failed; the edit is rejected and all bindings restored.
    TypeConflict(TypeError),
    /// A rename or creation collided with a live definition in the same graph.
    NameConflict { name: String, graph: GraphId },
    /// The editor supplied parameter names and ids of different lengths.
    LengthMismatch { names: usize, ids: usize },
    /// The operation referenced a block the core does not know.
    UnknownBlock { graph: GraphId, block: BlockId },
    /// The operation referenced a graph instance that does not exist.
    UnknownGraph(GraphId),
    /// A persisted type name could not be parsed.
    InvalidTypeName { name: String, reason: String },
    /// A persisted graph failed validation.
    InvalidWorkspace(PersistError),
}

impl ProcedureError {
    /// Whether this error reflects a user edit that must be rolled back, as
    /// opposed to a contract violation by the editor.
    pub fn is_rejected_edit(&self) -> bool {
        matches!(
            self,
            ProcedureError::TypeConflict(_) | ProcedureError::NameConflict { .. }
        )
    }
}

impl From<TypeError> for ProcedureError {
    fn from(err: TypeError) -> Self {
        ProcedureError::TypeConflict(err)
    }
}

impl fmt::Display for ProcedureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcedureError::TypeConflict(err) => write!(f, "type conflict: {}", err),
            ProcedureError::NameConflict { name, graph } => {
                write!(f, "procedure `{}` is already defined in {}", name, graph)
            }
            ProcedureError::LengthMismatch { names, ids } => write!(
                f,
                "parameter names and ids must be the same length ({} names, {} ids)",
                names, ids
            ),
            ProcedureError::UnknownBlock { graph, block } => {
                write!(f, "block {} is not a procedure block in {}", block, graph)
            }
            ProcedureError::UnknownGraph(graph) => write!(f, "unknown {}", graph),
            ProcedureError::InvalidTypeName { name, reason } => {
                write!(f, "invalid type name `{}`: {}", name, reason)
            }
            ProcedureError::InvalidWorkspace(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ProcedureError {}
