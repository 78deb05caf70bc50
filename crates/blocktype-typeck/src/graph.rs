//! Graph instances and the registry that owns them.
//!
//! [`GraphRegistry`] is the context object passed to every core operation. It
//! holds the privileged main graph, any detached auxiliary graphs (clipboard,
//! previews), and the single type table all of them share. Definitions in the
//! main graph are authoritative for every call site, wherever it lives.

use rustc_hash::FxHashMap;

use blocktype_common::{BlockId, GraphId};

use crate::call_site::{CallSite, Resolution, TypedProcedureCall};
use crate::definition::{Definition, TypedProcedureDefinition};
use crate::index::CallGraphIndex;
use crate::ty::Ty;
use crate::unify::TypeTable;

/// The procedure nodes of one graph instance.
#[derive(Clone, Debug)]
pub struct Graph {
    pub id: GraphId,
    definitions: FxHashMap<BlockId, Definition>,
    call_sites: FxHashMap<BlockId, CallSite>,
    index: CallGraphIndex,
}

impl Graph {
    pub fn new(id: GraphId) -> Self {
        Graph {
            id,
            definitions: FxHashMap::default(),
            call_sites: FxHashMap::default(),
            index: CallGraphIndex::new(),
        }
    }

    pub fn index(&self) -> &CallGraphIndex {
        &self.index
    }

    pub fn definition(&self, block: BlockId) -> Option<&Definition> {
        self.definitions.get(&block)
    }

    /// The live definition registered under `name` in this graph.
    pub fn definition_named(&self, name: &str) -> Option<&Definition> {
        self.index
            .definition(name)
            .and_then(|block| self.definitions.get(&block))
    }

    pub fn call_site(&self, block: BlockId) -> Option<&CallSite> {
        self.call_sites.get(&block)
    }

    /// Definitions ordered by block id.
    pub fn definitions(&self) -> Vec<&Definition> {
        let mut defs: Vec<&Definition> = self.definitions.values().collect();
        defs.sort_by_key(|d| d.block());
        defs
    }

    /// Call sites ordered by block id.
    pub fn call_sites(&self) -> Vec<&CallSite> {
        let mut calls: Vec<&CallSite> = self.call_sites.values().collect();
        calls.sort_by_key(|c| c.block());
        calls
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.call_sites.is_empty()
    }

    pub(crate) fn index_mut(&mut self) -> &mut CallGraphIndex {
        &mut self.index
    }

    pub(crate) fn definition_mut(&mut self, block: BlockId) -> Option<&mut Definition> {
        self.definitions.get_mut(&block)
    }

    pub(crate) fn call_site_mut(&mut self, block: BlockId) -> Option<&mut CallSite> {
        self.call_sites.get_mut(&block)
    }

    pub(crate) fn insert_definition(&mut self, def: Definition) {
        self.definitions.insert(def.block(), def);
    }

    pub(crate) fn remove_definition(&mut self, block: BlockId) -> Option<Definition> {
        let def = self.definitions.remove(&block)?;
        self.index.unregister_definition(def.name(), block);
        Some(def)
    }

    /// Insert a call site and register it under its procedure name.
    pub(crate) fn insert_call_site(&mut self, call: CallSite) {
        if let Some(previous) = self.remove_call_site(call.block()) {
            tracing::debug!(block = %previous.block(), "replacing existing call site");
        }
        self.index
            .register_call_site(call.procedure_name(), call.block());
        self.call_sites.insert(call.block(), call);
    }

    pub(crate) fn remove_call_site(&mut self, block: BlockId) -> Option<CallSite> {
        let call = self.call_sites.remove(&block)?;
        self.index
            .unregister_call_site(call.procedure_name(), block);
        Some(call)
    }
}

/// Owner of all graph instances and their shared type table.
pub struct GraphRegistry {
    main: GraphId,
    graphs: FxHashMap<GraphId, Graph>,
    pub(crate) types: TypeTable,
    next_graph: u32,
}

impl GraphRegistry {
    /// Create a registry holding an empty main graph, `GraphId(0)`.
    pub fn new() -> Self {
        let main = GraphId(0);
        let mut graphs = FxHashMap::default();
        graphs.insert(main, Graph::new(main));
        GraphRegistry {
            main,
            graphs,
            types: TypeTable::new(),
            next_graph: 1,
        }
    }

    pub fn main_graph(&self) -> GraphId {
        self.main
    }

    /// Add a detached graph instance, e.g. a clipboard preview.
    pub fn add_auxiliary(&mut self) -> GraphId {
        let id = GraphId(self.next_graph);
        self.next_graph += 1;
        self.graphs.insert(id, Graph::new(id));
        id
    }

    /// Drop an auxiliary graph. The main graph cannot be removed.
    pub fn remove_auxiliary(&mut self, id: GraphId) -> bool {
        id != self.main && self.graphs.remove(&id).is_some()
    }

    pub fn graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.get(&id)
    }

    pub(crate) fn graph_mut(&mut self, id: GraphId) -> Option<&mut Graph> {
        self.graphs.get_mut(&id)
    }

    pub(crate) fn replace_graph(&mut self, graph: Graph) {
        self.graphs.insert(graph.id, graph);
    }

    /// Main graph first, then auxiliary graphs in creation order.
    pub fn graph_ids(&self) -> Vec<GraphId> {
        let mut ids: Vec<GraphId> = self.graphs.keys().copied().collect();
        ids.sort_by_key(|id| (*id != self.main, *id));
        ids
    }

    pub fn is_main(&self, id: GraphId) -> bool {
        id == self.main
    }

    /// The authoritative definition of `name`: the one in the main graph.
    pub fn main_definition(&self, name: &str) -> Option<&Definition> {
        self.graphs.get(&self.main)?.definition_named(name)
    }

    /// Resolve a call site's procedure name against the main graph.
    pub fn resolve_definition(&self, name: &str) -> Resolution {
        match self.graphs.get(&self.main).and_then(|g| g.index().definition(name)) {
            Some(block) => Resolution::Resolved {
                graph: self.main,
                block,
            },
            None => Resolution::Dangling,
        }
    }

    /// Call sites of `name` in one graph instance.
    pub fn find_call_sites(&self, name: &str, graph: GraphId) -> Vec<BlockId> {
        self.graphs
            .get(&graph)
            .map(|g| g.index().call_sites(name))
            .unwrap_or_default()
    }

    /// Call sites of `name` across every graph instance, main graph first.
    pub fn callers_of(&self, name: &str) -> Vec<(GraphId, BlockId)> {
        self.graph_ids()
            .into_iter()
            .flat_map(|g| {
                self.find_call_sites(name, g)
                    .into_iter()
                    .map(move |block| (g, block))
            })
            .collect()
    }

    /// Resolved output type of a value call site.
    pub fn output_type(&mut self, graph: GraphId, block: BlockId) -> Option<Ty> {
        let ty = self.graphs.get(&graph)?.call_site(block)?.output_ty()?.clone();
        Some(self.types.resolve(&ty))
    }

    /// Resolved return type of a let-definition.
    pub fn return_type(&mut self, graph: GraphId, block: BlockId) -> Option<Ty> {
        let ty = self.graphs.get(&graph)?.definition(block)?.return_ty()?.clone();
        Some(self.types.resolve(&ty))
    }

    /// Resolve any type expression against the shared table.
    pub fn resolve(&mut self, ty: &Ty) -> Ty {
        self.types.resolve(ty)
    }

    /// A name not used by any definition in `graph`, derived from `name`.
    ///
    /// A trailing number is incremented (`foo2` → `foo3`); otherwise `2` is
    /// appended.
    pub fn find_legal_name(&self, graph: GraphId, name: &str) -> String {
        let Some(g) = self.graphs.get(&graph) else {
            return name.to_string();
        };
        let mut candidate = name.to_string();
        while g.index().definition(&candidate).is_some() {
            let digits = candidate
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit())
                .count();
            let (prefix, number) = candidate.split_at(candidate.len() - digits);
            candidate = match number.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
                Some(n) => format!("{}{}", prefix, n),
                None => format!("{}2", candidate),
            };
        }
        candidate
    }
}

impl Default for GraphRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Definition, LetDefinition};

    fn registry_with(names: &[(&str, u32)]) -> GraphRegistry {
        let mut registry = GraphRegistry::new();
        let ret = registry.types.fresh_var();
        let main = registry.main_graph();
        let graph = registry.graph_mut(main).unwrap();
        for (name, block) in names {
            let def = Definition::Let(LetDefinition::new(BlockId(*block), *name, ret.clone()));
            graph.index_mut().register_definition(name, BlockId(*block));
            graph.insert_definition(def);
        }
        registry
    }

    #[test]
    fn legal_name_appends_suffix() {
        let registry = registry_with(&[("foo", 1)]);
        let main = registry.main_graph();
        assert_eq!(registry.find_legal_name(main, "foo"), "foo2");
        assert_eq!(registry.find_legal_name(main, "bar"), "bar");
    }

    #[test]
    fn legal_name_increments_number() {
        let registry = registry_with(&[("foo", 1), ("foo2", 2), ("x9", 3)]);
        let main = registry.main_graph();
        assert_eq!(registry.find_legal_name(main, "foo"), "foo3");
        assert_eq!(registry.find_legal_name(main, "x9"), "x10");
    }

    #[test]
    fn legal_name_survives_numbers_past_u64() {
        let registry = registry_with(&[("x18446744073709551615", 1)]);
        let main = registry.main_graph();
        assert_eq!(
            registry.find_legal_name(main, "x18446744073709551615"),
            "x184467440737095516152"
        );
    }

    #[test]
    fn main_graph_is_first_and_permanent() {
        let mut registry = GraphRegistry::new();
        let aux = registry.add_auxiliary();
        let aux2 = registry.add_auxiliary();
        assert_eq!(registry.graph_ids(), vec![GraphId(0), aux, aux2]);
        assert!(!registry.remove_auxiliary(registry.main_graph()));
        assert!(registry.remove_auxiliary(aux));
        assert!(!registry.remove_auxiliary(aux));
        assert_eq!(registry.graph_ids(), vec![GraphId(0), aux2]);
    }

    #[test]
    fn resolution_uses_main_graph() {
        let mut registry = registry_with(&[("foo", 1)]);
        assert_eq!(
            registry.resolve_definition("foo"),
            Resolution::Resolved {
                graph: GraphId(0),
                block: BlockId(1)
            }
        );
        assert_eq!(registry.resolve_definition("bar"), Resolution::Dangling);

        // A definition that only exists in a preview graph does not resolve.
        let aux = registry.add_auxiliary();
        let ret = registry.types.fresh_var();
        let graph = registry.graph_mut(aux).unwrap();
        graph.index_mut().register_definition("bar", BlockId(1));
        graph.insert_definition(Definition::Let(LetDefinition::new(BlockId(1), "bar", ret)));
        assert_eq!(registry.resolve_definition("bar"), Resolution::Dangling);
    }
}
