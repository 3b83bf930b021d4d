use crate::ast::{ArrAlt, ArrBase, ArrBody, ArrGroup, ArrGroupKind};
use crate::error::{ParseError, ParseErrorKind, ParseResult};
use crate::token::TokenType;

use super::Parser;

/// Sequence-context grammar: `Arr`, `AGroup`, `AGroupBase`.
pub trait ArrayParsing {
    fn parse_array(&mut self) -> ParseResult<ArrBody>;
    fn parse_arr_items(&mut self, close: &TokenType) -> ParseResult<Vec<ArrGroup>>;
    fn parse_arr_group(&mut self) -> ParseResult<ArrGroup>;
    fn parse_arr_alt(&mut self) -> ParseResult<ArrAlt>;
    fn parse_arr_base(&mut self) -> ParseResult<ArrBase>;
}

impl ArrayParsing for Parser<'_> {
    fn parse_array(&mut self) -> ParseResult<ArrBody> {
        let start = self.span();
        self.expect(TokenType::LBracket, "[")?;
        let groups = self.parse_arr_items(&TokenType::RBracket)?;
        self.expect(TokenType::RBracket, "]")?;
        Ok(ArrBody {
            groups,
            span: start.merge(self.prev_span()),
        })
    }

    /// Comma separators between groups are optional.
    fn parse_arr_items(&mut self, close: &TokenType) -> ParseResult<Vec<ArrGroup>> {
        let mut groups = Vec::new();
        loop {
            while self.eat(&TokenType::Comma) {}
            if self.peek() == close {
                return Ok(groups);
            }
            if matches!(self.peek(), TokenType::Eof) {
                return Err(self.error_here(ParseErrorKind::UnexpectedToken {
                    expected: "]",
                    found: TokenType::Eof,
                }));
            }
            groups.push(self.parse_arr_group()?);
        }
    }

    fn parse_arr_group(&mut self) -> ParseResult<ArrGroup> {
        let start = self.span();
        if self.eat(&TokenType::DotDot) {
            if let Some(quant) = self.parse_quant_opt()? {
                return Err(ParseError::new(ParseErrorKind::QuantifierOnSpread, quant.span));
            }
            return Ok(ArrGroup {
                kind: ArrGroupKind::Spread,
                span: start.merge(self.prev_span()),
            });
        }
        let mut alts = vec![self.parse_arr_alt()?];
        while self.eat(&TokenType::Pipe) {
            alts.push(self.parse_arr_alt()?);
        }
        Ok(ArrGroup {
            kind: ArrGroupKind::Alts(alts),
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_arr_alt(&mut self) -> ParseResult<ArrAlt> {
        let start = self.span();
        let base = self.parse_arr_base()?;
        let quant = self.parse_quant_opt()?;
        Ok(ArrAlt {
            base,
            quant,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_arr_base(&mut self) -> ParseResult<ArrBase> {
        match self.peek().clone() {
            TokenType::LParen => {
                let start = self.span();
                self.advance();
                let groups = self.parse_arr_items(&TokenType::RParen)?;
                self.expect(TokenType::RParen, ")")?;
                Ok(ArrBase::Paren(ArrBody {
                    groups,
                    span: start.merge(self.prev_span()),
                }))
            }
            TokenType::LookAhead | TokenType::LookAheadNeg => {
                let negated = matches!(self.peek(), TokenType::LookAheadNeg);
                let start = self.span();
                self.advance();
                let groups = self.parse_arr_items(&TokenType::RParen)?;
                self.expect(TokenType::RParen, ")")?;
                Ok(ArrBase::Look {
                    negated,
                    body: ArrBody {
                        groups,
                        span: start.merge(self.prev_span()),
                    },
                })
            }
            TokenType::Dollar => {
                self.advance();
                let name = self.expect_name()?;
                let body = parse_eq_arr_body(self)?;
                Ok(ArrBase::ScalarBind { name, body })
            }
            TokenType::At => {
                self.advance();
                let name = self.expect_name()?;
                let body = parse_eq_arr_body(self)?;
                Ok(ArrBase::GroupBind { name, body })
            }
            _ => Ok(ArrBase::Term(self.parse_term()?)),
        }
    }
}

/// Optional `=( ABody )` suffix for `$x` / `@x` in sequence context.
fn parse_eq_arr_body(parser: &mut Parser<'_>) -> ParseResult<Option<ArrBody>> {
    if parser.peek() == &TokenType::Eq && parser.peek_at(1) == &TokenType::LParen {
        parser.advance();
        let start = parser.span();
        parser.advance();
        let groups = parser.parse_arr_items(&TokenType::RParen)?;
        parser.expect(TokenType::RParen, ")")?;
        Ok(Some(ArrBody {
            groups,
            span: start.merge(parser.prev_span()),
        }))
    } else {
        Ok(None)
    }
}
