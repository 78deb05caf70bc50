//! Type representation for procedure return slots.
//!
//! Defines the `Ty` enum, type constructors (`TyCon`) and type variables
//! (`TyVar`). Variables live in the `ena` unification table owned by
//! [`crate::unify::TypeTable`]; every slot that holds `Ty::Var(v)` observes the
//! same binding, which is how a call site follows its definition.

use std::fmt;

/// A type variable, identified by a `u32` index into the unification table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TyVar(pub u32);

/// A named type constructor such as `Number`, `String` or `List`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TyCon {
    pub name: String,
}

impl TyCon {
    pub fn new(name: impl Into<String>) -> Self {
        TyCon { name: name.into() }
    }
}

impl fmt::Display for TyCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A type expression.
///
/// - `Var`: an unbound placeholder, resolved through the unification table
/// - `Con`: a concrete named type with zero or more type arguments
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    /// A type variable.
    Var(TyVar),
    /// A concrete type constructor applied to its arguments: `Number`, `List<String>`.
    Con(TyCon, Vec<Ty>),
}

impl Ty {
    /// A nullary concrete type.
    pub fn con(name: impl Into<String>) -> Ty {
        Ty::Con(TyCon::new(name), Vec::new())
    }

    /// A parameterized concrete type.
    pub fn app(name: impl Into<String>, args: Vec<Ty>) -> Ty {
        Ty::Con(TyCon::new(name), args)
    }

    pub fn number() -> Ty {
        Ty::con("Number")
    }

    pub fn string() -> Ty {
        Ty::con("String")
    }

    pub fn boolean() -> Ty {
        Ty::con("Boolean")
    }

    /// Create a `List<T>` type.
    pub fn list(inner: Ty) -> Ty {
        Ty::app("List", vec![inner])
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Ty::Var(_))
    }

    /// Constructor name of a concrete type, `None` for variables.
    pub fn con_name(&self) -> Option<&str> {
        match self {
            Ty::Con(con, _) => Some(&con.name),
            Ty::Var(_) => None,
        }
    }

    /// Parse a persisted type name: `Name` or `Name<Arg, ...>`.
    ///
    /// Persisted names never contain variables, so the result is always
    /// concrete.
    pub fn parse(text: &str) -> Result<Ty, String> {
        let mut parser = TypeNameParser { src: text, pos: 0 };
        let ty = parser.parse_ty()?;
        parser.skip_ws();
        if parser.pos != text.len() {
            return Err(format!(
                "unexpected `{}` at offset {} in type name `{}`",
                &text[parser.pos..],
                parser.pos,
                text
            ));
        }
        Ok(ty)
    }
}

struct TypeNameParser<'a> {
    src: &'a str,
    pos: usize,
}

impl TypeNameParser<'_> {
    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn parse_ty(&mut self) -> Result<Ty, String> {
        self.skip_ws();
        let rest = &self.src[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(format!("expected a type name at offset {} in `{}`", self.pos, self.src));
        }
        let name = &rest[..len];
        self.pos += len;

        let mut args = Vec::new();
        if self.eat('<') {
            loop {
                args.push(self.parse_ty()?);
                if self.eat(',') {
                    continue;
                }
                if self.eat('>') {
                    break;
                }
                return Err(format!("expected `,` or `>` at offset {} in `{}`", self.pos, self.src));
            }
        }
        Ok(Ty::app(name, args))
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Var(v) => write!(f, "?{}", v.0),
            Ty::Con(con, args) => {
                write!(f, "{}", con)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
        }
    }
}

// ── ena trait implementations ──────────────────────────────────────────

impl ena::unify::UnifyKey for TyVar {
    type Value = Option<Ty>;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        TyVar(u)
    }

    fn tag() -> &'static str {
        "TyVar"
    }
}

impl ena::unify::EqUnifyValue for Ty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Ty::number().to_string(), "Number");
        assert_eq!(Ty::Var(TyVar(4)).to_string(), "?4");
        assert_eq!(
            Ty::app("Pair", vec![Ty::string(), Ty::list(Ty::boolean())]).to_string(),
            "Pair<String, List<Boolean>>"
        );
    }

    #[test]
    fn parse_nullary() {
        assert_eq!(Ty::parse("Number").unwrap(), Ty::number());
        assert_eq!(Ty::parse("  String ").unwrap(), Ty::string());
    }

    #[test]
    fn parse_parameterized() {
        assert_eq!(
            Ty::parse("Pair<Number, List<String>>").unwrap(),
            Ty::app("Pair", vec![Ty::number(), Ty::list(Ty::string())])
        );
    }

    #[test]
    fn parse_errors() {
        assert!(Ty::parse("").is_err());
        assert!(Ty::parse("List<Number").is_err());
        assert!(Ty::parse("List<>").is_err());
        let err = Ty::parse("Number junk").unwrap_err();
        assert!(err.contains("junk"), "{err}");
    }

    #[test]
    fn con_name() {
        assert_eq!(Ty::list(Ty::number()).con_name(), Some("List"));
        assert_eq!(Ty::Var(TyVar(0)).con_name(), None);
        assert!(Ty::Var(TyVar(0)).is_var());
    }
}
