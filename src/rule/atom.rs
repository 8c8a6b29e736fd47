//! Atoms: subject–relation–object patterns over variables and constants.

use serde::{Deserialize, Serialize};

use crate::symbol::SymbolId;

/// A rule variable, displayed as `?a`, `?b`, ..., `?z`, `?a1`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Var(pub u32);

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = (b'a' + (self.0 % 26) as u8) as char;
        match self.0 / 26 {
            0 => write!(f, "?{letter}"),
            round => write!(f, "?{letter}{round}"),
        }
    }
}

/// A term in an atom: a variable or a concrete symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Var(Var),
    Const(SymbolId),
}

impl Term {
    /// Returns `true` if this term is a variable.
    pub fn is_var(self) -> bool {
        matches!(self, Self::Var(_))
    }

    pub fn as_var(self) -> Option<Var> {
        match self {
            Self::Var(v) => Some(v),
            Self::Const(_) => None,
        }
    }

    pub fn as_const(self) -> Option<SymbolId> {
        match self {
            Self::Const(c) => Some(c),
            Self::Var(_) => None,
        }
    }
}

impl From<Var> for Term {
    fn from(v: Var) -> Self {
        Self::Var(v)
    }
}

impl From<SymbolId> for Term {
    fn from(c: SymbolId) -> Self {
        Self::Const(c)
    }
}

/// A position inside an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Subject,
    Relation,
    Object,
}

impl Position {
    /// The two argument positions, in the order operators try them.
    pub const ARGUMENTS: [Position; 2] = [Position::Subject, Position::Object];

    /// The opposite argument position. The relation position maps to itself.
    pub fn other(self) -> Self {
        match self {
            Self::Subject => Self::Object,
            Self::Object => Self::Subject,
            Self::Relation => Self::Relation,
        }
    }

    /// Column index in a fact row (`0`, `1`, `2`).
    pub fn index(self) -> usize {
        match self {
            Self::Subject => 0,
            Self::Relation => 1,
            Self::Object => 2,
        }
    }
}

/// A triple pattern `relation(subject, object)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Atom {
    pub subject: Term,
    pub relation: Term,
    pub object: Term,
}

impl Atom {
    pub fn new(subject: impl Into<Term>, relation: impl Into<Term>, object: impl Into<Term>) -> Self {
        Self {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }

    pub fn get(&self, position: Position) -> Term {
        match position {
            Position::Subject => self.subject,
            Position::Relation => self.relation,
            Position::Object => self.object,
        }
    }

    pub fn set(&mut self, position: Position, term: Term) {
        match position {
            Position::Subject => self.subject = term,
            Position::Relation => self.relation = term,
            Position::Object => self.object = term,
        }
    }

    /// Copy of this atom with `term` at `position`.
    pub fn with(mut self, position: Position, term: Term) -> Self {
        self.set(position, term);
        self
    }

    pub fn terms(&self) -> [Term; 3] {
        [self.subject, self.relation, self.object]
    }

    /// The concrete relation, if the relation position is bound.
    pub fn relation_id(&self) -> Option<SymbolId> {
        self.relation.as_const()
    }

    /// Position of `var` among subject/relation/object, if it occurs.
    pub fn position_of(&self, var: Var) -> Option<Position> {
        [Position::Subject, Position::Relation, Position::Object]
            .into_iter()
            .find(|&p| self.get(p) == Term::Var(var))
    }

    pub fn contains_var(&self, var: Var) -> bool {
        self.position_of(var).is_some()
    }

    /// Variables in subject and object position (no duplicates).
    pub fn argument_vars(&self) -> Vec<Var> {
        let mut vars = Vec::with_capacity(2);
        for term in [self.subject, self.object] {
            if let Term::Var(v) = term {
                if !vars.contains(&v) {
                    vars.push(v);
                }
            }
        }
        vars
    }

    /// Number of variable arguments (subject/object).
    pub fn variable_count(&self) -> usize {
        [self.subject, self.object].iter().filter(|t| t.is_var()).count()
    }

    /// Replace every occurrence of `var` with `term`.
    pub fn substitute(&self, var: Var, term: Term) -> Self {
        let swap = |t: Term| if t == Term::Var(var) { term } else { t };
        Self {
            subject: swap(self.subject),
            relation: swap(self.relation),
            object: swap(self.object),
        }
    }

    /// Match this pattern against a concrete fact, returning the variable
    /// bindings it induces, or `None` when a constant or a repeated variable
    /// disagrees with the fact.
    pub fn unify(&self, fact: [SymbolId; 3]) -> Option<Vec<(Var, SymbolId)>> {
        let mut bindings: Vec<(Var, SymbolId)> = Vec::with_capacity(3);
        for (term, value) in self.terms().into_iter().zip(fact) {
            match term {
                Term::Const(c) if c != value => return None,
                Term::Const(_) => {}
                Term::Var(v) => match bindings.iter().find(|(bound, _)| *bound == v) {
                    Some((_, existing)) if *existing != value => return None,
                    Some(_) => {}
                    None => bindings.push((v, value)),
                },
            }
        }
        Some(bindings)
    }

    /// `true` when both atoms can denote the same fact without renaming any
    /// variable: same relation, and each argument pair is either equal or
    /// pairs a variable with a constant.
    pub fn unifiable(&self, other: &Atom) -> bool {
        self.relation == other.relation
            && Position::ARGUMENTS.into_iter().all(|p| {
                let (a, b) = (self.get(p), other.get(p));
                a == b || a.is_var() != b.is_var()
            })
    }
}
