//! Normalized matcher IR. Produced by lowering, owned by the compiled
//! `Pattern`, immutable afterwards.

use regex::Regex;

use crate::guard::GuardExpr;
use crate::intern::{NameTable, Symbol};

/// A compiled pattern program: the IR tree plus everything a query needs
/// to resolve names.
#[derive(Debug)]
pub struct Program {
    pub root: Ir,
    pub names: NameTable,
    /// Every name a binder in the pattern can produce, in source order.
    pub binders: Vec<Symbol>,
    /// Guard variables no binder supplies; they must come from the
    /// environment seed or the query fails up front.
    pub open_guard_vars: Vec<String>,
    /// True when the root can match a sequence, which is what makes
    /// slice anchors meaningful in scan mode.
    pub wants_slices: bool,
}

#[derive(Debug)]
pub enum Ir {
    Any,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Regex(RegexIr),
    Alt(Vec<Ir>),
    Seq(Vec<SeqItem>),
    Obj(ObjIr),
    /// `$x` (scalar) or `@x` (group) against the current node.
    Bind {
        name: Symbol,
        group: bool,
        sub: Box<Ir>,
    },
    Look {
        negated: bool,
        sub: Box<Ir>,
    },
    /// Zero-width in sequence position; value position matches any node
    /// the guard admits.
    Guard(GuardExpr),
}

#[derive(Debug)]
pub struct RegexIr {
    pub regex: Regex,
    /// Original body, for display.
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Greedy,
    Reluctant,
    /// Longest feasible, then the whole span is committed.
    Possessive,
    /// `{m,n}`: counts ascending, each count committed like a possessive.
    Counted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantIr {
    pub min: usize,
    /// `usize::MAX` stands for unbounded.
    pub max: usize,
    pub policy: Policy,
}

impl QuantIr {
    pub const ONE: QuantIr = QuantIr {
        min: 1,
        max: 1,
        policy: Policy::Greedy,
    };

    pub fn is_one(&self) -> bool {
        self.min == 1 && self.max == 1
    }
}

/// One consumption unit of a sequence pattern.
#[derive(Debug)]
pub struct SeqItem {
    pub unit: SeqUnit,
    pub quant: QuantIr,
    /// Binds the full span all repetitions consumed.
    pub bind: Option<SpanBind>,
}

#[derive(Debug, Clone, Copy)]
pub struct SpanBind {
    pub name: Symbol,
    /// Scalar binds require a one-element span and bind the element;
    /// group binds bind the slice.
    pub group: bool,
}

#[derive(Debug)]
pub enum SeqUnit {
    /// Each repetition consumes one element matching the pattern.
    Elem(Ir),
    /// Each repetition consumes one sub-sequence span.
    Span(Vec<SeqItem>),
    /// Alternation between quantified units.
    AltSpan(Vec<SeqItem>),
    /// Zero-width sequence lookahead at the current position.
    Look { negated: bool, items: Vec<SeqItem> },
    /// Zero-width guard check.
    Guard(GuardExpr),
}

#[derive(Debug)]
pub struct ObjIr {
    pub members: Vec<ObjItem>,
    pub remnant: RemnantIr,
}

#[derive(Debug)]
pub enum ObjItem {
    Term(ObjTermIr),
    Group {
        bind: Option<Symbol>,
        members: Vec<ObjItem>,
    },
    Look {
        negated: bool,
        members: Vec<ObjItem>,
    },
    Guard(GuardExpr),
}

#[derive(Debug)]
pub struct ObjTermIr {
    /// `..`-led form: descend from the mapping root instead of selecting
    /// a top-level key.
    pub root: bool,
    /// None only when `root` is set.
    pub key: Option<Ir>,
    pub crumbs: Vec<CrumbIr>,
    pub imply: bool,
    pub value: Ir,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug)]
pub struct CrumbIr {
    /// `..` (any depth) rather than `.`/`[…]` (one step).
    pub skip: bool,
    /// None means any key at any depth (the trailing `..` idiom).
    pub key: Option<Ir>,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug)]
pub enum RemnantIr {
    /// No remnant written: the mapping must be exhausted. `$` and `(?!%)`
    /// spell the same thing explicitly.
    Exhaust,
    /// `%` / `remainder` / `@x=(%)`: leftovers allowed within bounds.
    Allow {
        capture: Option<Symbol>,
        min: usize,
        max: usize,
    },
}
