//! Unification engine.
//!
//! Implements unification over `ena`'s union-find table. A variable binding is
//! a shared cell: every slot holding `Ty::Var(v)` resolves through the same
//! table entry, so narrowing a definition's return variable is immediately
//! visible at all of its call sites. Snapshots of the table back the
//! propagation transaction's rollback.

use ena::unify::{InPlace, InPlaceUnificationTable, Snapshot};

use crate::error::TypeError;
use crate::ty::{Ty, TyVar};

/// A point in the table's history that can be rolled back to.
pub type TableSnapshot = Snapshot<InPlace<TyVar>>;

/// Owns every type variable of every graph instance.
pub struct TypeTable {
    table: InPlaceUnificationTable<TyVar>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable {
            table: InPlaceUnificationTable::new(),
        }
    }

    // ── Type Variable Creation ──────────────────────────────────────────

    /// Create a fresh, unbound type variable.
    pub fn fresh_var(&mut self) -> Ty {
        Ty::Var(self.table.new_key(None))
    }

    // ── Resolution ──────────────────────────────────────────────────────

    /// Resolve a type by following union-find indirection, including inside
    /// type arguments.
    ///
    /// Unbound variables are normalized to their root key so that variables
    /// in the same equivalence class resolve to the same representative.
    pub fn resolve(&mut self, ty: &Ty) -> Ty {
        match ty {
            Ty::Var(v) => match self.table.probe_value(*v) {
                Some(inner) => self.resolve(&inner),
                None => Ty::Var(self.table.find(*v)),
            },
            Ty::Con(con, args) => {
                let args = args.iter().map(|a| self.resolve(a)).collect();
                Ty::Con(con.clone(), args)
            }
        }
    }

    /// Whether two slots currently denote the same type.
    pub fn same_type(&mut self, a: &Ty, b: &Ty) -> bool {
        self.resolve(a) == self.resolve(b)
    }

    /// Whether the type resolves to an unbound variable.
    pub fn is_unbound(&mut self, ty: &Ty) -> bool {
        self.resolve(ty).is_var()
    }

    // ── Occurs Check ────────────────────────────────────────────────────

    fn occurs_in(&mut self, var: TyVar, ty: &Ty) -> bool {
        match ty {
            Ty::Var(v) => {
                if self.table.find(*v) == self.table.find(var) {
                    return true;
                }
                match self.table.probe_value(*v) {
                    Some(inner) => self.occurs_in(var, &inner),
                    None => false,
                }
            }
            Ty::Con(_, args) => args.iter().any(|a| self.occurs_in(var, a)),
        }
    }

    // ── Unification ─────────────────────────────────────────────────────

    /// Unify two types, making them equal.
    ///
    /// Atomic: if any part of the structure conflicts, bindings made while
    /// unifying earlier type arguments are undone before the error returns.
    pub fn unify(&mut self, a: &Ty, b: &Ty) -> Result<(), TypeError> {
        let snapshot = self.table.snapshot();
        match self.unify_inner(a, b) {
            Ok(()) => {
                self.table.commit(snapshot);
                Ok(())
            }
            Err(err) => {
                self.table.rollback_to(snapshot);
                Err(err)
            }
        }
    }

    fn unify_inner(&mut self, a: &Ty, b: &Ty) -> Result<(), TypeError> {
        let a = self.resolve(a);
        let b = self.resolve(b);

        match (a, b) {
            // Same representative: nothing to do.
            (Ty::Var(v1), Ty::Var(v2)) if v1 == v2 => Ok(()),

            (Ty::Var(v1), Ty::Var(v2)) => {
                self.table
                    .unify_var_var(v1, v2)
                    .expect("unifying two unbound vars should not fail");
                Ok(())
            }

            (Ty::Var(v), ty) | (ty, Ty::Var(v)) => {
                if self.occurs_in(v, &ty) {
                    return Err(TypeError::InfiniteType { var: v, ty });
                }
                self.table
                    .unify_var_value(v, Some(ty))
                    .expect("binding an unbound var after occurs check should not fail");
                Ok(())
            }

            (Ty::Con(c1, a1), Ty::Con(c2, a2)) => {
                if c1 != c2 {
                    return Err(TypeError::Mismatch {
                        expected: Ty::Con(c1, a1),
                        found: Ty::Con(c2, a2),
                    });
                }
                if a1.len() != a2.len() {
                    return Err(TypeError::ArityMismatch {
                        con: c1.name,
                        expected: a1.len(),
                        found: a2.len(),
                    });
                }
                for (x, y) in a1.iter().zip(a2.iter()) {
                    self.unify_inner(x, y)?;
                }
                Ok(())
            }
        }
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    pub fn snapshot(&mut self) -> TableSnapshot {
        self.table.snapshot()
    }

    pub fn rollback_to(&mut self, snapshot: TableSnapshot) {
        self.table.rollback_to(snapshot);
    }

    pub fn commit(&mut self, snapshot: TableSnapshot) {
        self.table.commit(snapshot);
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unify_two_fresh_vars() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();
        let b = table.fresh_var();

        assert!(table.unify(&a, &b).is_ok());

        // Binding one side is visible through the other.
        assert!(table.unify(&a, &Ty::number()).is_ok());
        assert_eq!(table.resolve(&a), Ty::number());
        assert_eq!(table.resolve(&b), Ty::number());
    }

    #[test]
    fn unify_var_with_concrete() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();
        assert!(table.unify(&Ty::string(), &a).is_ok());
        assert_eq!(table.resolve(&a), Ty::string());
        assert!(!table.is_unbound(&a));
    }

    #[test]
    fn unify_is_idempotent() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();
        assert!(table.unify(&a, &a).is_ok());
        assert!(table.is_unbound(&a));

        table.unify(&a, &Ty::number()).unwrap();
        let before = table.resolve(&a);
        for _ in 0..3 {
            table.unify(&a, &a).unwrap();
            table.unify(&a, &Ty::number()).unwrap();
        }
        assert_eq!(table.resolve(&a), before);
    }

    #[test]
    fn unify_mismatch_leaves_bindings_unchanged() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();
        let b = table.fresh_var();
        table.unify(&a, &Ty::number()).unwrap();
        table.unify(&b, &Ty::string()).unwrap();

        let result = table.unify(&a, &b);
        assert_eq!(
            result,
            Err(TypeError::Mismatch {
                expected: Ty::number(),
                found: Ty::string(),
            })
        );
        assert_eq!(table.resolve(&a), Ty::number());
        assert_eq!(table.resolve(&b), Ty::string());
    }

    #[test]
    fn nested_failure_rolls_back_earlier_arguments() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();
        let left = Ty::app("Pair", vec![a.clone(), Ty::number()]);
        let right = Ty::app("Pair", vec![Ty::string(), Ty::boolean()]);

        assert!(table.unify(&left, &right).is_err());
        // `a` was bound to String while unifying the first argument.
        assert!(table.is_unbound(&a));
    }

    #[test]
    fn arity_mismatch() {
        let mut table = TypeTable::new();
        let result = table.unify(
            &Ty::app("Pair", vec![Ty::number()]),
            &Ty::app("Pair", vec![Ty::number(), Ty::number()]),
        );
        assert_eq!(
            result,
            Err(TypeError::ArityMismatch {
                con: "Pair".into(),
                expected: 1,
                found: 2,
            })
        );
    }

    #[test]
    fn parameterized_types_unify_pairwise() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();
        table
            .unify(&Ty::list(a.clone()), &Ty::list(Ty::boolean()))
            .unwrap();
        assert_eq!(table.resolve(&a), Ty::boolean());
        assert_eq!(
            table.resolve(&Ty::list(a)),
            Ty::list(Ty::boolean())
        );
    }

    #[test]
    fn occurs_check_infinite_type() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();
        let result = table.unify(&a, &Ty::list(a.clone()));
        assert!(matches!(result, Err(TypeError::InfiniteType { .. })));
        assert!(table.is_unbound(&a));
    }

    #[test]
    fn rollback_restores_bindings_and_drops_new_vars() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();

        let snapshot = table.snapshot();
        table.unify(&a, &Ty::number()).unwrap();
        let _scratch = table.fresh_var();
        table.rollback_to(snapshot);

        assert!(table.is_unbound(&a));
        // The next variable reuses the rolled-back index.
        assert_eq!(table.fresh_var(), Ty::Var(TyVar(1)));
    }

    #[test]
    fn commit_keeps_bindings() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();
        let snapshot = table.snapshot();
        table.unify(&a, &Ty::string()).unwrap();
        table.commit(snapshot);
        assert_eq!(table.resolve(&a), Ty::string());
    }

    #[test]
    fn var_chain_resolves_to_root() {
        let mut table = TypeTable::new();
        let a = table.fresh_var();
        let b = table.fresh_var();
        let c = table.fresh_var();
        table.unify(&a, &b).unwrap();
        table.unify(&b, &c).unwrap();
        assert!(table.same_type(&a, &c));
        assert!(!table.same_type(&a, &Ty::number()));
    }
}
