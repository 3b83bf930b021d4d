//! Surface AST as produced by the parser, before lowering.

use crate::intern::Symbol;
use crate::token::{RegexFlags, Span};

/// `Item := Term ('|' Term)*`
#[derive(Debug, Clone)]
pub struct Item {
    pub alts: Vec<Term>,
    pub span: Span,
}

impl Item {
    /// The single term of a one-alternative item, if that is what this is.
    pub fn single(&self) -> Option<&Term> {
        if self.alts.len() == 1 {
            Some(&self.alts[0])
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Term {
    pub kind: TermKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TermKind {
    Paren(Box<Item>),
    Look { negated: bool, body: Box<Item> },
    ScalarBind { name: Symbol, body: Option<Box<Item>> },
    GroupBind { name: Symbol, body: Option<Box<Item>> },
    Any,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Regex { source: String, flags: RegexFlags },
    Guard(GuardSrc),
    Obj(ObjBody),
    Arr(ArrBody),
}

/// Raw text of a `#( … )` guard; parsed by the guard mini-language
/// parser during lowering.
#[derive(Debug, Clone)]
pub struct GuardSrc {
    pub src: String,
    pub span: Span,
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ArrBody {
    pub groups: Vec<ArrGroup>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ArrGroup {
    pub kind: ArrGroupKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ArrGroupKind {
    /// `..`: absorbs any span
    Spread,
    /// `AGroupBase Quant? ('|' AGroupBase Quant?)*`
    Alts(Vec<ArrAlt>),
}

#[derive(Debug, Clone)]
pub struct ArrAlt {
    pub base: ArrBase,
    pub quant: Option<Quant>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ArrBase {
    /// `( ABody )`: a sub-sequence matched as one unit per repetition
    Paren(ArrBody),
    /// `(?= ABody )` / `(?! ABody )`: zero-width sequence lookahead
    Look { negated: bool, body: ArrBody },
    /// `@x` / `@x=(ABody)`
    GroupBind { name: Symbol, body: Option<ArrBody> },
    /// `$x` / `$x=(ABody)`
    ScalarBind { name: Symbol, body: Option<ArrBody> },
    /// Any value-level term (atoms, nested containers, guards)
    Term(Term),
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ObjBody {
    pub members: Vec<ObjMember>,
    pub remnant: Option<Remnant>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ObjMember {
    pub kind: ObjMemberKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ObjMemberKind {
    Term(ObjTerm),
    /// `( OBody )`: grouping, shares the key pool
    Paren(Vec<ObjMember>),
    /// `@x=( OBody )`: binds the keys the group consumes
    GroupBind { name: Symbol, body: Vec<ObjMember> },
    /// `(?= OGroup )` / `(?! OGroup )`
    Look { negated: bool, body: Vec<ObjMember> },
    Guard(GuardSrc),
}

#[derive(Debug, Clone)]
pub struct ObjTerm {
    /// True for the `..`-led form: descend from the mapping root.
    pub root: bool,
    /// Key pattern; None only when `root` is set.
    pub key: Option<Item>,
    pub crumbs: Vec<Breadcrumb>,
    /// `:>` instead of `:`
    pub imply: bool,
    pub value: Item,
    /// `#?` / `#{m,n}` key-count quantifier
    pub quant: Option<Quant>,
    /// Trailing `?`
    pub optional: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Breadcrumb {
    pub kind: CrumbKind,
    /// None for the trailing `..` ("any key, any depth") form.
    pub key: Option<Item>,
    pub quant: Option<Quant>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrumbKind {
    /// `.key`: one step
    Dot,
    /// `[key]`: one step
    Bracket,
    /// `..key`: any depth
    Skip,
}

#[derive(Debug, Clone)]
pub struct Remnant {
    /// `@x=(%)` capture name
    pub capture: Option<Symbol>,
    /// `$` or `(?!%)`: the mapping must be exhausted
    pub assert_empty: bool,
    /// `#{m,n}` residual bound
    pub quant: Option<Quant>,
    pub span: Span,
}

// ---------------------------------------------------------------------------
// Quantifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Quant {
    pub kind: QuantKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantKind {
    /// `?`
    Optional,
    /// `??`
    OptionalReluctant,
    /// `+`
    Plus,
    /// `+?`
    PlusReluctant,
    /// `++`
    PlusPossessive,
    /// `*`
    Star,
    /// `*?`
    StarReluctant,
    /// `*+`
    StarPossessive,
    /// `{m}` / `{m,n}` / `{m,}` / `{,n}`
    Range { min: usize, max: Option<usize> },
}
