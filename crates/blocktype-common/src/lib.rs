//! Shared types for blocktype: graph, block and parameter identifiers, slot
//! references, and the persisted workspace shapes the editor hands to the
//! type core.

pub mod ids;
pub mod persist;

pub use ids::{BlockId, GraphId, ParamId, SlotRef, OUTPUT_SLOT, RETURN_SLOT};
pub use persist::{PersistError, PersistedCallSite, PersistedDefinition, PersistedGraph};
