//! Identifiers shared by the editor boundary and the type propagation core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the value input on a let-definition that provides the return value.
pub const RETURN_SLOT: &str = "RETURN";

/// Pseudo-slot name for a block's own output connection.
pub const OUTPUT_SLOT: &str = "OUTPUT";

/// A graph instance: the main program graph or a detached preview/clipboard graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub u32);

/// A block inside a graph instance. Unique within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

/// Stable identity of a procedure parameter, independent of its display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamId(pub String);

impl ParamId {
    pub fn new(id: impl Into<String>) -> Self {
        ParamId(id.into())
    }
}

/// A named connection point on a block: one of its inputs, or its output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub block: BlockId,
    pub name: String,
}

impl SlotRef {
    pub fn input(block: BlockId, name: impl Into<String>) -> Self {
        SlotRef { block, name: name.into() }
    }

    pub fn output(block: BlockId) -> Self {
        SlotRef { block, name: OUTPUT_SLOT.to_string() }
    }

    pub fn is_output(&self) -> bool {
        self.name == OUTPUT_SLOT
    }

    /// Argument input `ARG{index}` of a call block.
    pub fn arg(block: BlockId, index: usize) -> Self {
        SlotRef { block, name: format!("ARG{index}") }
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph {}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.block, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_display() {
        assert_eq!(SlotRef::input(BlockId(3), RETURN_SLOT).to_string(), "#3.RETURN");
        assert_eq!(SlotRef::output(BlockId(7)).to_string(), "#7.OUTPUT");
        assert_eq!(SlotRef::arg(BlockId(1), 2).to_string(), "#1.ARG2");
    }

    #[test]
    fn output_slot_is_recognised() {
        assert!(SlotRef::output(BlockId(1)).is_output());
        assert!(!SlotRef::input(BlockId(1), "VALUE").is_output());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&(GraphId(0), BlockId(12), ParamId::new("q1"))).unwrap();
        assert_eq!(json, r#"[0,12,"q1"]"#);
    }
}
