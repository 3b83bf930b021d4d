use std::collections::HashSet;

use crate::ast::{
    Breadcrumb, CrumbKind, GuardSrc, Item, ObjBody, ObjMember, ObjMemberKind, ObjTerm, Quant,
    QuantKind, Remnant, Term, TermKind,
};
use crate::error::{ParseErrorKind, ParseResult};
use crate::token::TokenType;

use super::Parser;

/// Object-context grammar: `Obj`, `OGroup`, `OTerm`, breadcrumbs and the
/// remnant forms.
pub trait ObjectParsing {
    fn parse_object(&mut self) -> ParseResult<ObjBody>;
}

impl ObjectParsing for Parser<'_> {
    fn parse_object(&mut self) -> ParseResult<ObjBody> {
        let start = self.span();
        self.expect(TokenType::LBrace, "{")?;
        let mut members = Vec::new();
        let mut remnant = None;
        let mut seen_keys = HashSet::new();
        loop {
            while self.eat(&TokenType::Comma) {}
            if self.peek() == &TokenType::RBrace {
                break;
            }
            if remnant.is_some() {
                return Err(self.error_here(ParseErrorKind::UnexpectedToken {
                    expected: "} after remainder",
                    found: self.peek().clone(),
                }));
            }
            if let Some(r) = try_parse_remnant(self)? {
                remnant = Some(r);
                continue;
            }
            members.push(parse_member(self, &mut seen_keys)?);
        }
        self.expect(TokenType::RBrace, "}")?;
        Ok(ObjBody {
            members,
            remnant,
            span: start.merge(self.prev_span()),
        })
    }
}

/// Recognizes the remnant forms: `$`, `%`, `remainder`, `@x=(%)`,
/// `(?!%)`: all of which share prefixes with ordinary members.
fn try_parse_remnant(parser: &mut Parser<'_>) -> ParseResult<Option<Remnant>> {
    let start = parser.span();
    match parser.peek() {
        // `$` not followed by a name is the exhaustion shortcut.
        TokenType::Dollar if !matches!(parser.peek_at(1), TokenType::Id(_)) => {
            parser.advance();
            Ok(Some(Remnant {
                capture: None,
                assert_empty: true,
                quant: None,
                span: start,
            }))
        }
        TokenType::Remainder => {
            parser.advance();
            let quant = parse_remnant_quant(parser)?;
            Ok(Some(Remnant {
                capture: None,
                assert_empty: false,
                quant,
                span: start.merge(parser.prev_span()),
            }))
        }
        // `(?! %)` asserts exhaustion.
        TokenType::LookAheadNeg if parser.peek_at(1) == &TokenType::Remainder => {
            parser.advance();
            parser.advance();
            parser.expect(TokenType::RParen, ")")?;
            Ok(Some(Remnant {
                capture: None,
                assert_empty: true,
                quant: None,
                span: start.merge(parser.prev_span()),
            }))
        }
        // `@x=( % ?? )` captures the remainder projection.
        TokenType::At
            if matches!(parser.peek_at(1), TokenType::Id(_))
                && parser.peek_at(2) == &TokenType::Eq
                && parser.peek_at(3) == &TokenType::LParen
                && parser.peek_at(4) == &TokenType::Remainder =>
        {
            parser.advance();
            let name = parser.expect_name()?;
            parser.advance(); // '='
            parser.advance(); // '('
            parser.advance(); // '%'
            parser.eat(&TokenType::Question);
            parser.expect(TokenType::RParen, ")")?;
            let quant = parse_remnant_quant(parser)?;
            Ok(Some(Remnant {
                capture: Some(name),
                assert_empty: false,
                quant,
                span: start.merge(parser.prev_span()),
            }))
        }
        _ => Ok(None),
    }
}

fn parse_remnant_quant(parser: &mut Parser<'_>) -> ParseResult<Option<Quant>> {
    if parser.eat(&TokenType::Question) {
        // `%?` adds nothing over bare `%`; accepted for compatibility.
        return Ok(None);
    }
    if parser.peek() == &TokenType::HashLBrace {
        let start = parser.span();
        parser.advance();
        let (min, max) = parser.parse_range_tail()?;
        return Ok(Some(Quant {
            kind: QuantKind::Range { min, max },
            span: start.merge(parser.prev_span()),
        }));
    }
    Ok(None)
}

fn parse_member(parser: &mut Parser<'_>, seen: &mut HashSet<String>) -> ParseResult<ObjMember> {
    let start = parser.span();
    let kind = match parser.peek().clone() {
        TokenType::LookAhead | TokenType::LookAheadNeg => {
            let negated = matches!(parser.peek(), TokenType::LookAheadNeg);
            parser.advance();
            // Lookahead wraps a single group; use parens inside for more.
            let mut inner_seen = HashSet::new();
            let body = vec![parse_member(parser, &mut inner_seen)?];
            parser.expect(TokenType::RParen, ")")?;
            ObjMemberKind::Look { negated, body }
        }
        TokenType::LParen => {
            parser.advance();
            let body = parse_members_until(parser, TokenType::RParen, seen)?;
            parser.expect(TokenType::RParen, ")")?;
            ObjMemberKind::Paren(body)
        }
        TokenType::At => {
            parser.advance();
            let name = parser.expect_name()?;
            parser.expect(TokenType::Eq, "=")?;
            parser.expect(TokenType::LParen, "(")?;
            let body = parse_members_until(parser, TokenType::RParen, seen)?;
            parser.expect(TokenType::RParen, ")")?;
            ObjMemberKind::GroupBind { name, body }
        }
        TokenType::Guard(src) => {
            let token = parser.advance();
            ObjMemberKind::Guard(GuardSrc {
                src,
                span: token.span,
            })
        }
        TokenType::DotDot => {
            parser.advance();
            if matches!(parser.peek(), TokenType::Colon | TokenType::ColonImply) {
                // `{.. : v}`: any key, any depth, from the root.
                ObjMemberKind::Term(parse_term_tail(parser, true, None, Vec::new())?)
            } else if matches!(
                parser.peek(),
                TokenType::Comma | TokenType::RBrace | TokenType::Eof
            ) {
                return Err(parser.error_here(ParseErrorKind::BareSpreadInObject));
            } else if matches!(
                parser.peek(),
                TokenType::Dot | TokenType::LBracket | TokenType::DotDot
            ) {
                // Root form whose first breadcrumb is written explicitly.
                let crumbs = parse_breadcrumbs(parser)?;
                ObjMemberKind::Term(parse_term_tail(parser, true, None, crumbs)?)
            } else {
                // `{..key … : v}`: the leading `..` fuses with the key
                // into the first skip breadcrumb.
                let crumb_start = parser.span();
                let key = parse_key_term(parser)?;
                let quant = parser.parse_quant_opt()?;
                let mut crumbs = vec![Breadcrumb {
                    kind: CrumbKind::Skip,
                    key: Some(single_item(key)),
                    quant,
                    span: crumb_start.merge(parser.prev_span()),
                }];
                crumbs.extend(parse_breadcrumbs(parser)?);
                ObjMemberKind::Term(parse_term_tail(parser, true, None, crumbs)?)
            }
        }
        _ => {
            let key = parse_key_item(parser)?;
            if let Some(TermKind::Str(s)) = key.single().map(|t| &t.kind) {
                if !seen.insert(s.clone()) {
                    return Err(crate::error::ParseError::new(
                        ParseErrorKind::DuplicateLiteralKey(s.clone()),
                        key.span,
                    ));
                }
            }
            let crumbs = parse_breadcrumbs(parser)?;
            ObjMemberKind::Term(parse_term_tail(parser, false, Some(key), crumbs)?)
        }
    };
    Ok(ObjMember {
        kind,
        span: start.merge(parser.prev_span()),
    })
}

fn parse_members_until(
    parser: &mut Parser<'_>,
    close: TokenType,
    seen: &mut HashSet<String>,
) -> ParseResult<Vec<ObjMember>> {
    let mut members = Vec::new();
    loop {
        while parser.eat(&TokenType::Comma) {}
        if parser.peek() == &close || matches!(parser.peek(), TokenType::Eof) {
            return Ok(members);
        }
        members.push(parse_member(parser, seen)?);
    }
}

/// `(':'|':>') Item OQuant? '?'?`: everything after key and breadcrumbs.
fn parse_term_tail(
    parser: &mut Parser<'_>,
    root: bool,
    key: Option<Item>,
    crumbs: Vec<Breadcrumb>,
) -> ParseResult<ObjTerm> {
    let start = key
        .as_ref()
        .map(|k| k.span)
        .unwrap_or_else(|| parser.span());
    let imply = match parser.peek() {
        TokenType::Colon => {
            parser.advance();
            false
        }
        TokenType::ColonImply => {
            parser.advance();
            true
        }
        found => {
            return Err(parser.error_here(ParseErrorKind::UnexpectedToken {
                expected: "':' or ':>'",
                found: found.clone(),
            }))
        }
    };
    let value = parser.parse_item()?;
    let quant = parse_obj_quant(parser)?;
    let optional = parser.eat(&TokenType::Question);
    Ok(ObjTerm {
        root,
        key,
        crumbs,
        imply,
        value,
        quant,
        optional,
        span: start.merge(parser.prev_span()),
    })
}

/// `#?` or `#{m,n}`: how many keys the term may consume.
fn parse_obj_quant(parser: &mut Parser<'_>) -> ParseResult<Option<Quant>> {
    let start = parser.span();
    match parser.peek() {
        TokenType::HashQuestion => {
            parser.advance();
            Ok(Some(Quant {
                kind: QuantKind::Optional,
                span: start,
            }))
        }
        TokenType::HashLBrace => {
            parser.advance();
            let (min, max) = parser.parse_range_tail()?;
            Ok(Some(Quant {
                kind: QuantKind::Range { min, max },
                span: start.merge(parser.prev_span()),
            }))
        }
        _ => Ok(None),
    }
}

fn parse_breadcrumbs(parser: &mut Parser<'_>) -> ParseResult<Vec<Breadcrumb>> {
    let mut crumbs = Vec::new();
    loop {
        let start = parser.span();
        match parser.peek() {
            TokenType::Dot => {
                parser.advance();
                let key = parse_key_term(parser)?;
                let quant = parser.parse_quant_opt()?;
                crumbs.push(Breadcrumb {
                    kind: CrumbKind::Dot,
                    key: Some(single_item(key)),
                    quant,
                    span: start.merge(parser.prev_span()),
                });
            }
            TokenType::LBracket => {
                parser.advance();
                let key = parse_key_item(parser)?;
                parser.expect(TokenType::RBracket, "]")?;
                let quant = parser.parse_quant_opt()?;
                crumbs.push(Breadcrumb {
                    kind: CrumbKind::Bracket,
                    key: Some(key),
                    quant,
                    span: start.merge(parser.prev_span()),
                });
            }
            TokenType::DotDot => {
                parser.advance();
                if matches!(parser.peek(), TokenType::Colon | TokenType::ColonImply) {
                    // Trailing `..`: any key, any depth, ends the chain.
                    crumbs.push(Breadcrumb {
                        kind: CrumbKind::Skip,
                        key: None,
                        quant: None,
                        span: start,
                    });
                    return Ok(crumbs);
                }
                let key = parse_key_term(parser)?;
                let quant = parser.parse_quant_opt()?;
                crumbs.push(Breadcrumb {
                    kind: CrumbKind::Skip,
                    key: Some(single_item(key)),
                    quant,
                    span: start.merge(parser.prev_span()),
                });
            }
            _ => return Ok(crumbs),
        }
    }
}

/// Keys admit alternation: `("a"|"b"): v`.
fn parse_key_item(parser: &mut Parser<'_>) -> ParseResult<Item> {
    let start = parser.span();
    let mut alts = vec![parse_key_term(parser)?];
    while parser.eat(&TokenType::Pipe) {
        alts.push(parse_key_term(parser)?);
    }
    Ok(Item {
        alts,
        span: start.merge(parser.prev_span()),
    })
}

/// A key position reads bare identifiers as literal key strings; `true`,
/// `false` and `null` likewise name keys here, not values.
fn parse_key_term(parser: &mut Parser<'_>) -> ParseResult<Term> {
    let start = parser.span();
    let kind = match parser.peek().clone() {
        TokenType::Id(sym) => {
            let text = parser.names.resolve(sym).to_string();
            parser.advance();
            TermKind::Str(text)
        }
        TokenType::Str(s) => {
            parser.advance();
            TermKind::Str(s)
        }
        TokenType::Num(n) => {
            parser.advance();
            TermKind::Num(n)
        }
        TokenType::Bool(b) => {
            parser.advance();
            TermKind::Str(b.to_string())
        }
        TokenType::Null => {
            parser.advance();
            TermKind::Str("null".to_string())
        }
        TokenType::Regex { source, flags } => {
            parser.advance();
            TermKind::Regex { source, flags }
        }
        TokenType::Any => {
            parser.advance();
            TermKind::Any
        }
        TokenType::Dollar => {
            parser.advance();
            let name = parser.expect_name()?;
            let body = if parser.peek() == &TokenType::Eq && parser.peek_at(1) == &TokenType::LParen
            {
                parser.advance();
                parser.advance();
                let body = parse_key_item(parser)?;
                parser.expect(TokenType::RParen, ")")?;
                Some(Box::new(body))
            } else {
                None
            };
            TermKind::ScalarBind { name, body }
        }
        TokenType::LParen => {
            parser.advance();
            let body = parse_key_item(parser)?;
            parser.expect(TokenType::RParen, ")")?;
            TermKind::Paren(Box::new(body))
        }
        found => {
            return Err(parser.error_here(ParseErrorKind::UnexpectedToken {
                expected: "object key",
                found,
            }))
        }
    };
    Ok(Term {
        kind,
        span: start.merge(parser.prev_span()),
    })
}

fn single_item(term: Term) -> Item {
    let span = term.span;
    Item {
        alts: vec![term],
        span,
    }
}
