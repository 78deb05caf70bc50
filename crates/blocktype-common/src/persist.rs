//! Persisted workspace shapes.
//!
//! The editor owns serialization; the type core only reads these shapes to
//! rebuild its nodes. Type variables are never persisted: a loaded workspace
//! gets fresh variables and one full re-unification pass.

use std::fmt;
use std::path::Path;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, ParamId};

fn yes() -> bool {
    true
}

/// A saved procedure definition block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDefinition {
    pub block: BlockId,
    pub name: String,
    #[serde(default)]
    pub argument_ids: Vec<ParamId>,
    /// Display names for the arguments. Missing names fall back to the id.
    #[serde(default)]
    pub argument_names: Vec<String>,
    /// `true` for let-style definitions that produce a value.
    #[serde(default = "yes")]
    pub returning: bool,
}

impl PersistedDefinition {
    /// Argument display names, padded with ids where the saved names run out.
    pub fn names(&self) -> Vec<String> {
        self.argument_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                self.argument_names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| id.0.clone())
            })
            .collect()
    }
}

/// A saved procedure call block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCallSite {
    pub block: BlockId,
    pub procedure_name: String,
    /// Last known output type name, e.g. `"Number"` or `"List<String>"`.
    #[serde(default)]
    pub type_name: Option<String>,
    /// `false` for statement calls to void procedures.
    #[serde(default = "yes")]
    pub returns_value: bool,
}

/// One saved graph instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedGraph {
    #[serde(default)]
    pub definitions: Vec<PersistedDefinition>,
    #[serde(default)]
    pub call_sites: Vec<PersistedCallSite>,
}

/// Error produced while reading or validating a persisted graph.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistError {
    /// The file could not be read.
    Io(String),
    /// The JSON did not match the persisted shape.
    Malformed(String),
    /// Two saved blocks share a block id.
    DuplicateBlock(BlockId),
    /// Two saved definitions share a procedure name.
    DuplicateName(String),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "failed to read workspace: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed workspace: {msg}"),
            Self::DuplicateBlock(id) => write!(f, "block {id} appears more than once"),
            Self::DuplicateName(name) => write!(f, "procedure `{name}` is defined more than once"),
        }
    }
}

impl std::error::Error for PersistError {}

impl PersistedGraph {
    /// Parse and validate a graph from JSON text.
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        let graph: PersistedGraph =
            serde_json::from_str(content).map_err(|e| PersistError::Malformed(e.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Read, parse and validate a graph from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, PersistError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PersistError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Block ids must be unique across the graph and definition names unique
    /// among definitions.
    pub fn validate(&self) -> Result<(), PersistError> {
        let mut blocks = FxHashSet::default();
        let mut names = FxHashSet::default();
        for def in &self.definitions {
            if !blocks.insert(def.block) {
                return Err(PersistError::DuplicateBlock(def.block));
            }
            if !names.insert(def.name.as_str()) {
                return Err(PersistError::DuplicateName(def.name.clone()));
            }
        }
        for call in &self.call_sites {
            if !blocks.insert(call.block) {
                return Err(PersistError::DuplicateBlock(call.block));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_workspace() {
        let json = r#"{
            "definitions": [
                { "block": 1, "name": "foo", "argumentIds": ["a1", "a2"], "argumentNames": ["x"] }
            ],
            "callSites": [
                { "block": 2, "procedureName": "foo", "typeName": "Number" },
                { "block": 3, "procedureName": "foo" }
            ]
        }"#;
        let graph = PersistedGraph::from_json(json).unwrap();
        assert_eq!(graph.definitions.len(), 1);
        let def = &graph.definitions[0];
        assert!(def.returning);
        assert_eq!(def.names(), vec!["x".to_string(), "a2".to_string()]);
        assert_eq!(graph.call_sites[0].type_name.as_deref(), Some("Number"));
        assert_eq!(graph.call_sites[1].type_name, None);
        assert!(graph.call_sites[1].returns_value);
    }

    #[test]
    fn duplicate_block_rejected() {
        let json = r#"{
            "definitions": [{ "block": 1, "name": "foo" }],
            "callSites": [{ "block": 1, "procedureName": "foo" }]
        }"#;
        assert_eq!(
            PersistedGraph::from_json(json).unwrap_err(),
            PersistError::DuplicateBlock(BlockId(1))
        );
    }

    #[test]
    fn duplicate_name_rejected() {
        let json = r#"{
            "definitions": [{ "block": 1, "name": "foo" }, { "block": 2, "name": "foo" }]
        }"#;
        let err = PersistedGraph::from_json(json).unwrap_err();
        assert_eq!(err.to_string(), "procedure `foo` is defined more than once");
    }

    #[test]
    fn malformed_json_reported() {
        let err = PersistedGraph::from_json("{ \"definitions\": 3 }").unwrap_err();
        assert!(matches!(err, PersistError::Malformed(_)));
    }

    #[test]
    fn serialized_form_is_camel_case() {
        let graph = PersistedGraph {
            definitions: vec![],
            call_sites: vec![PersistedCallSite {
                block: BlockId(4),
                procedure_name: "bar".into(),
                type_name: None,
                returns_value: true,
            }],
        };
        let json = graph.to_json();
        assert!(json.contains("\"procedureName\": \"bar\""));
        assert!(json.contains("\"callSites\""));
    }
}
