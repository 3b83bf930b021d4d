//! Lowering: surface AST → normalized matcher IR.
//!
//! Canonicalizations, per the surface rules: alternations flatten
//! left-associatively, a single-element parenthesized sequence unwraps to
//! its item, every quantifier form resolves to `{min, max, policy}`, a
//! leading `..` object key becomes a root term with a skip breadcrumb,
//! and regex literals compile here so a bad regex is a compile error, not
//! a runtime one.

use crate::ast::{
    ArrAlt, ArrBase, ArrBody, ArrGroupKind, Breadcrumb, CrumbKind, GuardSrc, Item, ObjBody,
    ObjMember, ObjMemberKind, ObjTerm, Quant, QuantKind, Remnant, Term, TermKind,
};
use crate::error::{LowerError, LowerErrorKind, LowerResult};
use crate::guard::{parse_guard, GuardExpr};
use crate::intern::{NameTable, Symbol};
use crate::ir::{
    CrumbIr, Ir, ObjIr, ObjItem, ObjTermIr, Policy, Program, QuantIr, RegexIr, RemnantIr, SeqItem,
    SeqUnit, SpanBind,
};
use crate::token::{RegexFlags, Span};

pub fn lower(item: &Item, names: NameTable) -> LowerResult<Program> {
    let mut cx = Lowerer {
        names,
        binders: Vec::new(),
        guard_vars: Vec::new(),
    };
    let root = cx.lower_item(item)?;
    let open_guard_vars = cx
        .guard_vars
        .iter()
        .filter(|name| {
            !cx.binders
                .iter()
                .any(|sym| cx.names.resolve(*sym) == name.as_str())
        })
        .cloned()
        .collect();
    let wants_slices = can_match_seq(&root);
    Ok(Program {
        root,
        names: cx.names,
        binders: cx.binders,
        open_guard_vars,
        wants_slices,
    })
}

struct Lowerer {
    names: NameTable,
    binders: Vec<Symbol>,
    guard_vars: Vec<String>,
}

impl Lowerer {
    fn bind(&mut self, name: Symbol) {
        if !self.binders.contains(&name) {
            self.binders.push(name);
        }
    }

    fn lower_item(&mut self, item: &Item) -> LowerResult<Ir> {
        let mut alts = Vec::new();
        for term in &item.alts {
            match self.lower_term(term)? {
                Ir::Alt(sub) => alts.extend(sub),
                other => alts.push(other),
            }
        }
        Ok(if alts.len() == 1 {
            alts.pop().unwrap()
        } else {
            Ir::Alt(alts)
        })
    }

    fn lower_term(&mut self, term: &Term) -> LowerResult<Ir> {
        Ok(match &term.kind {
            TermKind::Paren(item) => self.lower_item(item)?,
            TermKind::Look { negated, body } => Ir::Look {
                negated: *negated,
                sub: Box::new(self.lower_item(body)?),
            },
            TermKind::ScalarBind { name, body } => {
                self.bind(*name);
                let sub = match body {
                    Some(item) => self.lower_item(item)?,
                    None => Ir::Any,
                };
                Ir::Bind {
                    name: *name,
                    group: false,
                    sub: Box::new(sub),
                }
            }
            TermKind::GroupBind { name, body } => {
                self.bind(*name);
                let sub = match body {
                    Some(item) => self.lower_item(item)?,
                    None => Ir::Any,
                };
                Ir::Bind {
                    name: *name,
                    group: true,
                    sub: Box::new(sub),
                }
            }
            TermKind::Any => Ir::Any,
            TermKind::Null => Ir::Null,
            TermKind::Bool(b) => Ir::Bool(*b),
            TermKind::Num(n) => Ir::Num(*n),
            TermKind::Str(s) => Ir::Str(s.clone()),
            TermKind::Regex { source, flags } => {
                Ir::Regex(compile_regex(source, *flags, term.span)?)
            }
            TermKind::Guard(src) => Ir::Guard(self.lower_guard(src)?),
            TermKind::Obj(body) => self.lower_obj(body)?,
            TermKind::Arr(body) => Ir::Seq(self.lower_arr_items(body)?),
        })
    }

    fn lower_guard(&mut self, src: &GuardSrc) -> LowerResult<GuardExpr> {
        let expr = parse_guard(&src.src)
            .map_err(|msg| LowerError::new(LowerErrorKind::GuardSyntax(msg), src.span))?;
        expr.free_vars(&mut self.guard_vars);
        Ok(expr)
    }

    // -- sequences ----------------------------------------------------------

    fn lower_arr_items(&mut self, body: &ArrBody) -> LowerResult<Vec<SeqItem>> {
        let mut items = Vec::new();
        for group in &body.groups {
            match &group.kind {
                ArrGroupKind::Spread => items.push(SeqItem {
                    unit: SeqUnit::Elem(Ir::Any),
                    quant: QuantIr {
                        min: 0,
                        max: usize::MAX,
                        policy: Policy::Reluctant,
                    },
                    bind: None,
                }),
                ArrGroupKind::Alts(alts) => {
                    if alts.len() == 1 {
                        items.push(self.lower_arr_alt(&alts[0])?);
                    } else {
                        let lowered = alts
                            .iter()
                            .map(|a| self.lower_arr_alt(a))
                            .collect::<LowerResult<Vec<_>>>()?;
                        items.push(SeqItem {
                            unit: SeqUnit::AltSpan(lowered),
                            quant: QuantIr::ONE,
                            bind: None,
                        });
                    }
                }
            }
        }
        Ok(items)
    }

    fn lower_arr_alt(&mut self, alt: &ArrAlt) -> LowerResult<SeqItem> {
        let quant = alt.quant.map(to_quant_ir).unwrap_or(QuantIr::ONE);
        Ok(match &alt.base {
            ArrBase::Paren(body) => {
                let items = self.lower_arr_items(body)?;
                if alt.quant.is_none() && items.len() == 1 {
                    // Single-element group unwraps to its item.
                    items.into_iter().next().unwrap()
                } else {
                    SeqItem {
                        unit: SeqUnit::Span(items),
                        quant,
                        bind: None,
                    }
                }
            }
            ArrBase::Look { negated, body } => SeqItem {
                unit: SeqUnit::Look {
                    negated: *negated,
                    items: self.lower_arr_items(body)?,
                },
                quant: QuantIr::ONE,
                bind: None,
            },
            ArrBase::ScalarBind { name, body } => {
                self.bind(*name);
                let unit = self.lower_bind_body(body.as_ref())?;
                if alt.quant.is_none() {
                    // An unquantified `$x` binds one element; its body must
                    // consume exactly one.
                    let elem = match unit {
                        SeqUnit::Elem(ir) => ir,
                        _ => {
                            return Err(LowerError::new(
                                LowerErrorKind::BindArity(
                                    self.names.resolve(*name).to_string(),
                                ),
                                alt.span,
                            ))
                        }
                    };
                    SeqItem {
                        unit: SeqUnit::Elem(elem),
                        quant,
                        bind: Some(SpanBind {
                            name: *name,
                            group: false,
                        }),
                    }
                } else {
                    // Quantified `$x…` binds the whole consumed span.
                    SeqItem {
                        unit,
                        quant,
                        bind: Some(SpanBind {
                            name: *name,
                            group: true,
                        }),
                    }
                }
            }
            ArrBase::GroupBind { name, body } => {
                self.bind(*name);
                let unit = self.lower_bind_body(body.as_ref())?;
                SeqItem {
                    unit,
                    quant,
                    bind: Some(SpanBind {
                        name: *name,
                        group: true,
                    }),
                }
            }
            ArrBase::Term(term) => {
                // A guard in sequence position is zero-width, not an
                // element pattern.
                let unit = match &term.kind {
                    TermKind::Guard(src) => SeqUnit::Guard(self.lower_guard(src)?),
                    _ => SeqUnit::Elem(self.lower_term(term)?),
                };
                SeqItem {
                    unit,
                    quant,
                    bind: None,
                }
            }
        })
    }

    /// The `=(…)` body of a sequence binder: one element if it lowers to
    /// one plain element (an alternation of plain elements collapses to
    /// a node-level alternation), otherwise a span unit.
    fn lower_bind_body(&mut self, body: Option<&ArrBody>) -> LowerResult<SeqUnit> {
        let Some(body) = body else {
            return Ok(SeqUnit::Elem(Ir::Any));
        };
        let mut items = self.lower_arr_items(body)?;
        if items.len() == 1 {
            let only = &items[0];
            if only.quant.is_one() && only.bind.is_none() {
                match &only.unit {
                    SeqUnit::Elem(_) => {
                        let SeqItem { unit, .. } = items.pop().unwrap();
                        return Ok(unit);
                    }
                    SeqUnit::AltSpan(alts)
                        if alts.iter().all(|a| {
                            a.quant.is_one()
                                && a.bind.is_none()
                                && matches!(a.unit, SeqUnit::Elem(_))
                        }) =>
                    {
                        let Some(SeqItem {
                            unit: SeqUnit::AltSpan(alts),
                            ..
                        }) = items.pop()
                        else {
                            unreachable!()
                        };
                        let irs = alts
                            .into_iter()
                            .map(|a| match a.unit {
                                SeqUnit::Elem(ir) => ir,
                                _ => unreachable!(),
                            })
                            .collect();
                        return Ok(SeqUnit::Elem(Ir::Alt(irs)));
                    }
                    _ => {}
                }
            }
        }
        Ok(SeqUnit::Span(items))
    }

    // -- objects ------------------------------------------------------------

    fn lower_obj(&mut self, body: &ObjBody) -> LowerResult<Ir> {
        let members = body
            .members
            .iter()
            .map(|m| self.lower_obj_member(m))
            .collect::<LowerResult<Vec<_>>>()?;
        let remnant = self.lower_remnant(body.remnant.as_ref())?;
        Ok(Ir::Obj(ObjIr { members, remnant }))
    }

    fn lower_obj_member(&mut self, member: &ObjMember) -> LowerResult<ObjItem> {
        Ok(match &member.kind {
            ObjMemberKind::Term(term) => ObjItem::Term(self.lower_obj_term(term)?),
            ObjMemberKind::Paren(members) => ObjItem::Group {
                bind: None,
                members: members
                    .iter()
                    .map(|m| self.lower_obj_member(m))
                    .collect::<LowerResult<Vec<_>>>()?,
            },
            ObjMemberKind::GroupBind { name, body } => {
                self.bind(*name);
                ObjItem::Group {
                    bind: Some(*name),
                    members: body
                        .iter()
                        .map(|m| self.lower_obj_member(m))
                        .collect::<LowerResult<Vec<_>>>()?,
                }
            }
            ObjMemberKind::Look { negated, body } => ObjItem::Look {
                negated: *negated,
                members: body
                    .iter()
                    .map(|m| self.lower_obj_member(m))
                    .collect::<LowerResult<Vec<_>>>()?,
            },
            ObjMemberKind::Guard(src) => ObjItem::Guard(self.lower_guard(src)?),
        })
    }

    fn lower_obj_term(&mut self, term: &ObjTerm) -> LowerResult<ObjTermIr> {
        let key = match &term.key {
            Some(item) => Some(self.lower_item(item)?),
            None => None,
        };
        let mut crumbs = term
            .crumbs
            .iter()
            .map(|c| self.lower_crumb(c))
            .collect::<LowerResult<Vec<_>>>()?;
        if term.root && crumbs.is_empty() {
            // `{.. : v}`: any key, any depth, from the mapping root.
            crumbs.push(CrumbIr {
                skip: true,
                key: None,
                min: 0,
                max: usize::MAX,
            });
        }
        let (mut min, max) = match term.quant.map(|q| q.kind) {
            // An unquantified `:>` sweeps however many keys match; an
            // unquantified `:` selects exactly one.
            None if term.imply => (0, usize::MAX),
            None => (1, 1),
            Some(QuantKind::Optional) => (0, 1),
            Some(QuantKind::Range { min, max }) => (min, max.unwrap_or(usize::MAX)),
            // The parser only produces `#?` and `#{…}` in this position.
            Some(_) => (1, 1),
        };
        if term.optional {
            min = 0;
        }
        Ok(ObjTermIr {
            root: term.root,
            key,
            crumbs,
            imply: term.imply,
            value: self.lower_item(&term.value)?,
            min,
            max,
        })
    }

    fn lower_crumb(&mut self, crumb: &Breadcrumb) -> LowerResult<CrumbIr> {
        let skip = crumb.kind == CrumbKind::Skip;
        let key = match &crumb.key {
            Some(item) => Some(self.lower_item(item)?),
            None => None,
        };
        let (min, max) = match crumb.quant {
            Some(q) => {
                let ir = to_quant_ir(q);
                (ir.min, ir.max)
            }
            // A step happens once; a skip descends any number of levels.
            None if skip => (0, usize::MAX),
            None => (1, 1),
        };
        Ok(CrumbIr { skip, key, min, max })
    }

    fn lower_remnant(&mut self, remnant: Option<&Remnant>) -> LowerResult<RemnantIr> {
        let Some(remnant) = remnant else {
            return Ok(RemnantIr::Exhaust);
        };
        if remnant.assert_empty {
            return Ok(RemnantIr::Exhaust);
        }
        if let Some(name) = remnant.capture {
            self.bind(name);
        }
        let (min, max) = match remnant.quant.map(|q| q.kind) {
            Some(QuantKind::Range { min, max }) => (min, max.unwrap_or(usize::MAX)),
            Some(QuantKind::Optional) => (0, 1),
            _ => (0, usize::MAX),
        };
        Ok(RemnantIr::Allow {
            capture: remnant.capture,
            min,
            max,
        })
    }
}

fn to_quant_ir(quant: Quant) -> QuantIr {
    let (min, max, policy) = match quant.kind {
        QuantKind::Optional => (0, 1, Policy::Greedy),
        QuantKind::OptionalReluctant => (0, 1, Policy::Reluctant),
        QuantKind::Plus => (1, usize::MAX, Policy::Greedy),
        QuantKind::PlusReluctant => (1, usize::MAX, Policy::Reluctant),
        QuantKind::PlusPossessive => (1, usize::MAX, Policy::Possessive),
        QuantKind::Star => (0, usize::MAX, Policy::Greedy),
        QuantKind::StarReluctant => (0, usize::MAX, Policy::Reluctant),
        QuantKind::StarPossessive => (0, usize::MAX, Policy::Possessive),
        QuantKind::Range { min, max } => (min, max.unwrap_or(usize::MAX), Policy::Counted),
    };
    QuantIr { min, max, policy }
}

fn compile_regex(source: &str, flags: RegexFlags, span: Span) -> LowerResult<RegexIr> {
    let mut pattern = String::new();
    let mut inline = String::new();
    if flags.ignore_case {
        inline.push('i');
    }
    if flags.multi_line {
        inline.push('m');
    }
    if flags.dot_all {
        inline.push('s');
    }
    if !inline.is_empty() {
        pattern.push_str("(?");
        pattern.push_str(&inline);
        pattern.push(')');
    }
    if flags.sticky {
        // Sticky means "match from the start of the subject" here.
        pattern.push_str(r"\A(?:");
        pattern.push_str(source);
        pattern.push(')');
    } else {
        pattern.push_str(source);
    }
    // The `u` flag is inherent: the regex crate is Unicode by default.
    let regex = regex::Regex::new(&pattern)
        .map_err(|e| LowerError::new(LowerErrorKind::BadRegex(e.to_string()), span))?;
    Ok(RegexIr {
        regex,
        source: source.to_string(),
    })
}

fn can_match_seq(ir: &Ir) -> bool {
    match ir {
        Ir::Seq(_) => true,
        Ir::Alt(alts) => alts.iter().any(can_match_seq),
        Ir::Bind { sub, .. } => can_match_seq(sub),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn lower_src(src: &str) -> LowerResult<Program> {
        let mut names = NameTable::new();
        let tokens = Lexer::new(src, &mut names).tokenize().expect("lex");
        let item = Parser::new(tokens, &names).parse().expect("parse");
        lower(&item, names)
    }

    #[test]
    fn alternation_flattens() {
        let program = lower_src("(1 | 2) | 3").unwrap();
        match program.root {
            Ir::Alt(ref alts) => assert_eq!(alts.len(), 3),
            ref other => panic!("expected flattened alternation, got {:?}", other),
        }
    }

    #[test]
    fn quantified_scalar_binder_becomes_group() {
        let program = lower_src("[$a+]").unwrap();
        match program.root {
            Ir::Seq(ref items) => {
                let bind = items[0].bind.expect("binder");
                assert!(bind.group);
                assert_eq!(items[0].quant.min, 1);
                assert_eq!(items[0].quant.max, usize::MAX);
            }
            ref other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn multi_element_scalar_bind_body_is_rejected() {
        let err = lower_src("[$a=((1, 2))]").unwrap_err();
        assert!(matches!(err.kind, LowerErrorKind::BindArity(_)));
    }

    #[test]
    fn counted_range_is_counted_policy() {
        let program = lower_src("[_{2,4}]").unwrap();
        match program.root {
            Ir::Seq(ref items) => {
                assert_eq!(items[0].quant.min, 2);
                assert_eq!(items[0].quant.max, 4);
                assert_eq!(items[0].quant.policy, Policy::Counted);
            }
            ref other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn object_without_remnant_is_exhaustive() {
        let program = lower_src("{a: 1}").unwrap();
        match program.root {
            Ir::Obj(ref obj) => assert!(matches!(obj.remnant, RemnantIr::Exhaust)),
            ref other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn open_guard_vars_survive_to_the_program() {
        let program = lower_src("#($limit > 3)").unwrap();
        assert_eq!(program.open_guard_vars, vec!["limit".to_string()]);
        let closed = lower_src("{n: $limit, m: #($limit > 3)}").unwrap();
        assert!(closed.open_guard_vars.is_empty());
    }

    #[test]
    fn bad_regex_is_a_lower_error() {
        let err = lower_src("/([unclosed/").unwrap_err();
        assert!(matches!(err.kind, LowerErrorKind::BadRegex(_)));
    }
}
