mod array;
mod object;

pub use array::ArrayParsing;
pub use object::ObjectParsing;

use crate::ast::{GuardSrc, Item, Quant, QuantKind, Term, TermKind};
use crate::error::{ParseError, ParseErrorKind, ParseResult};
use crate::token::{Span, Token, TokenType};

use std::ops::{Deref, DerefMut};

#[derive(Clone, Copy)]
struct ParserCheckpoint {
    pos: usize,
}

/// Backtracking scope: rolls the parser back on drop unless committed.
pub struct ParserGuard<'p, 'int> {
    parser: &'p mut Parser<'int>,
    checkpoint: ParserCheckpoint,
    committed: bool,
}

impl<'p, 'int> ParserGuard<'p, 'int> {
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<'p, 'int> Drop for ParserGuard<'p, 'int> {
    fn drop(&mut self) {
        if !self.committed {
            self.parser.current = self.checkpoint.pos;
        }
    }
}

impl<'p, 'int> Deref for ParserGuard<'p, 'int> {
    type Target = Parser<'int>;
    fn deref(&self) -> &Self::Target {
        self.parser
    }
}

impl<'p, 'int> DerefMut for ParserGuard<'p, 'int> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.parser
    }
}

/// Recursive-descent parser over the token stream. One token of
/// lookahead everywhere; checkpoints where alternatives share a prefix
/// (quantifier braces, object remnant forms, group-vs-capture).
pub struct Parser<'int> {
    pub(super) tokens: Vec<Token>,
    pub(super) current: usize,
    /// Read-only: the lexer already interned identifiers; key positions
    /// resolve them back to literal text.
    pub(super) names: &'int crate::intern::NameTable,
}

impl<'int> Parser<'int> {
    pub fn new(tokens: Vec<Token>, names: &'int crate::intern::NameTable) -> Self {
        Self {
            tokens,
            current: 0,
            names,
        }
    }

    /// Parses a complete pattern; trailing input is rejected.
    pub fn parse(mut self) -> ParseResult<Item> {
        let item = self.parse_item()?;
        if !matches!(self.peek(), TokenType::Eof) {
            return Err(self.error_here(ParseErrorKind::TrailingInput));
        }
        Ok(item)
    }

    // -- token plumbing -----------------------------------------------------

    pub(super) fn peek(&self) -> &TokenType {
        &self.tokens[self.current.min(self.tokens.len() - 1)].ty
    }

    pub(super) fn peek_at(&self, ahead: usize) -> &TokenType {
        &self.tokens[(self.current + ahead).min(self.tokens.len() - 1)].ty
    }

    pub(super) fn span(&self) -> Span {
        self.tokens[self.current.min(self.tokens.len() - 1)].span
    }

    pub(super) fn prev_span(&self) -> Span {
        self.tokens[self.current.saturating_sub(1)].span
    }

    pub(super) fn advance(&mut self) -> Token {
        let token = self.tokens[self.current.min(self.tokens.len() - 1)].clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    pub(super) fn eat(&mut self, ty: &TokenType) -> bool {
        if self.peek() == ty {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(super) fn expect(&mut self, ty: TokenType, expected: &'static str) -> ParseResult<Token> {
        if self.peek() == &ty {
            Ok(self.advance())
        } else {
            Err(self.error_here(ParseErrorKind::UnexpectedToken {
                expected,
                found: self.peek().clone(),
            }))
        }
    }

    pub(super) fn error_here(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(kind, self.span())
    }

    pub(super) fn guard(&mut self) -> ParserGuard<'_, 'int> {
        let checkpoint = ParserCheckpoint { pos: self.current };
        ParserGuard {
            parser: self,
            checkpoint,
            committed: false,
        }
    }

    // -- value-context grammar ----------------------------------------------

    /// `Item := Term ('|' Term)*`
    pub(super) fn parse_item(&mut self) -> ParseResult<Item> {
        let start = self.span();
        let mut alts = vec![self.parse_term()?];
        while self.eat(&TokenType::Pipe) {
            alts.push(self.parse_term()?);
        }
        let span = start.merge(self.prev_span());
        Ok(Item { alts, span })
    }

    pub(super) fn parse_term(&mut self) -> ParseResult<Term> {
        let start = self.span();
        let kind = match self.peek().clone() {
            TokenType::LParen => {
                self.advance();
                let body = self.parse_item()?;
                self.expect(TokenType::RParen, ")")?;
                TermKind::Paren(Box::new(body))
            }
            TokenType::LookAhead | TokenType::LookAheadNeg => {
                let negated = matches!(self.peek(), TokenType::LookAheadNeg);
                self.advance();
                let body = self.parse_item()?;
                self.expect(TokenType::RParen, ")")?;
                TermKind::Look {
                    negated,
                    body: Box::new(body),
                }
            }
            TokenType::Dollar => {
                self.advance();
                let name = self.expect_name()?;
                let body = self.parse_eq_item_body()?;
                TermKind::ScalarBind { name, body }
            }
            TokenType::At => {
                self.advance();
                let name = self.expect_name()?;
                let body = self.parse_eq_item_body()?;
                TermKind::GroupBind { name, body }
            }
            TokenType::Any => {
                self.advance();
                TermKind::Any
            }
            TokenType::Null => {
                self.advance();
                TermKind::Null
            }
            TokenType::Bool(b) => {
                self.advance();
                TermKind::Bool(b)
            }
            TokenType::Num(n) => {
                self.advance();
                TermKind::Num(n)
            }
            TokenType::Str(s) => {
                self.advance();
                TermKind::Str(s)
            }
            TokenType::Regex { source, flags } => {
                self.advance();
                TermKind::Regex { source, flags }
            }
            TokenType::Guard(src) => {
                let token = self.advance();
                TermKind::Guard(GuardSrc {
                    src,
                    span: token.span,
                })
            }
            TokenType::LBrace => {
                let body = self.parse_object()?;
                TermKind::Obj(body)
            }
            TokenType::LBracket => {
                let body = self.parse_array()?;
                TermKind::Arr(body)
            }
            found => return Err(self.error_here(ParseErrorKind::ExpectedPattern { found })),
        };
        let span = start.merge(self.prev_span());
        Ok(Term { kind, span })
    }

    pub(super) fn expect_name(&mut self) -> ParseResult<crate::intern::Symbol> {
        match self.peek().clone() {
            TokenType::Id(sym) => {
                self.advance();
                Ok(sym)
            }
            found => Err(self.error_here(ParseErrorKind::UnexpectedToken {
                expected: "identifier",
                found,
            })),
        }
    }

    /// Optional `=( Item )` suffix for `$x` / `@x` in value context.
    fn parse_eq_item_body(&mut self) -> ParseResult<Option<Box<Item>>> {
        if self.peek() == &TokenType::Eq && self.peek_at(1) == &TokenType::LParen {
            self.advance();
            self.advance();
            let body = self.parse_item()?;
            self.expect(TokenType::RParen, ")")?;
            Ok(Some(Box::new(body)))
        } else {
            Ok(None)
        }
    }

    // -- quantifiers --------------------------------------------------------

    /// Parses an optional quantifier suffix. `{…}` is only committed when
    /// the next token can open a count range; otherwise it is left for the
    /// caller (an object pattern may follow without a comma).
    pub(super) fn parse_quant_opt(&mut self) -> ParseResult<Option<Quant>> {
        let start = self.span();
        let kind = match self.peek() {
            TokenType::Question => QuantKind::Optional,
            TokenType::QuestionQuestion => QuantKind::OptionalReluctant,
            TokenType::Plus => QuantKind::Plus,
            TokenType::PlusQuestion => QuantKind::PlusReluctant,
            TokenType::PlusPlus => QuantKind::PlusPossessive,
            TokenType::Star => QuantKind::Star,
            TokenType::StarQuestion => QuantKind::StarReluctant,
            TokenType::StarPlus => QuantKind::StarPossessive,
            TokenType::LBrace => {
                // `{` may open a count range or a following object pattern
                // (commas between sequence elements are optional). Attempt
                // the range under a guard and fall back on shape mismatch.
                let mut guard = self.guard();
                guard.advance();
                return match guard.parse_range_tail() {
                    Ok((min, max)) => {
                        let span = start.merge(guard.prev_span());
                        guard.commit();
                        Ok(Some(Quant {
                            kind: QuantKind::Range { min, max },
                            span,
                        }))
                    }
                    Err(e) if matches!(e.kind, ParseErrorKind::BoundsReversed { .. }) => Err(e),
                    Err(_) => Ok(None),
                };
            }
            _ => return Ok(None),
        };
        self.advance();
        Ok(Some(Quant {
            kind,
            span: start.merge(self.prev_span()),
        }))
    }

    /// `N (',' N?)? '}'` or `',' N '}'`: shared by `{…}` and `#{…}`.
    pub(super) fn parse_range_tail(&mut self) -> ParseResult<(usize, Option<usize>)> {
        if self.eat(&TokenType::Comma) {
            let max = self.expect_count()?;
            self.expect(TokenType::RBrace, "}")?;
            return Ok((0, Some(max)));
        }
        let min = self.expect_count()?;
        if self.eat(&TokenType::Comma) {
            if self.eat(&TokenType::RBrace) {
                return Ok((min, None));
            }
            let max = self.expect_count()?;
            self.expect(TokenType::RBrace, "}")?;
            if max < min {
                return Err(ParseError::new(
                    ParseErrorKind::BoundsReversed { min, max },
                    self.prev_span(),
                ));
            }
            return Ok((min, Some(max)));
        }
        self.expect(TokenType::RBrace, "}")?;
        Ok((min, Some(min)))
    }

    fn expect_count(&mut self) -> ParseResult<usize> {
        match *self.peek() {
            TokenType::Num(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => {
                self.advance();
                Ok(n as usize)
            }
            _ => Err(self.error_here(ParseErrorKind::BadQuantBound)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::NameTable;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> ParseResult<Item> {
        let mut names = NameTable::new();
        let tokens = Lexer::new(src, &mut names).tokenize()?;
        Parser::new(tokens, &names).parse()
    }

    #[test]
    fn alternation_is_flat_left_to_right() {
        let item = parse("1 | 2 | 3").unwrap();
        assert_eq!(item.alts.len(), 3);
    }

    #[test]
    fn trailing_input_is_rejected() {
        let err = parse("1 2").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TrailingInput);
    }

    #[test]
    fn reversed_bounds_are_rejected() {
        let err = parse("[$a{3,1}]").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::BoundsReversed { min: 3, max: 1 }));
    }

    #[test]
    fn scalar_bind_with_body() {
        let item = parse("$x=(/^p/)").unwrap();
        match &item.alts[0].kind {
            TermKind::ScalarBind { body, .. } => assert!(body.is_some()),
            other => panic!("expected scalar bind, got {:?}", other),
        }
    }
}
