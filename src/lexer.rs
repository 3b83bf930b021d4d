use crate::error::{ParseError, ParseErrorKind, ParseResult};
use crate::intern::NameTable;
use crate::token::{RegexFlags, Span, Token, TokenType};

/// Single-pass lexer over pattern source. Whitespace is insignificant;
/// every token carries its byte span for error rendering.
pub struct Lexer<'a, 'int> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    names: &'int mut NameTable,
}

impl<'a, 'int> Lexer<'a, 'int> {
    pub fn new(source: &'a str, names: &'int mut NameTable) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            names,
        }
    }

    pub fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                tokens.push(Token::new(TokenType::Eof, Span::new(self.pos, self.pos)));
                return Ok(tokens);
            }
            let token = self.next_token()?;
            tokens.push(token);
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self, ahead: usize) -> u8 {
        *self.bytes.get(self.pos + ahead).unwrap_or(&0)
    }

    fn error(&self, kind: ParseErrorKind, start: usize) -> ParseError {
        ParseError::new(kind, Span::new(start, self.pos.max(start + 1)))
    }

    fn next_token(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        let b = self.bytes[self.pos];

        let simple = |this: &mut Self, ty: TokenType, len: usize| {
            this.pos += len;
            Ok(Token::new(ty, Span::new(start, this.pos)))
        };

        match b {
            b'{' => simple(self, TokenType::LBrace, 1),
            b'}' => simple(self, TokenType::RBrace, 1),
            b'[' => simple(self, TokenType::LBracket, 1),
            b']' => simple(self, TokenType::RBracket, 1),
            b')' => simple(self, TokenType::RParen, 1),
            b',' => simple(self, TokenType::Comma, 1),
            b'=' => simple(self, TokenType::Eq, 1),
            b'|' => simple(self, TokenType::Pipe, 1),
            b'$' => simple(self, TokenType::Dollar, 1),
            b'@' => simple(self, TokenType::At, 1),
            b'!' => simple(self, TokenType::Bang, 1),
            b'%' => simple(self, TokenType::Remainder, 1),
            b'(' => match (self.peek(1), self.peek(2)) {
                (b'?', b'=') => simple(self, TokenType::LookAhead, 3),
                (b'?', b'!') => simple(self, TokenType::LookAheadNeg, 3),
                _ => simple(self, TokenType::LParen, 1),
            },
            b':' => {
                if self.peek(1) == b'>' {
                    simple(self, TokenType::ColonImply, 2)
                } else {
                    simple(self, TokenType::Colon, 1)
                }
            }
            b'.' => {
                if self.peek(1) == b'.' {
                    simple(self, TokenType::DotDot, 2)
                } else {
                    simple(self, TokenType::Dot, 1)
                }
            }
            b'?' => {
                if self.peek(1) == b'?' {
                    simple(self, TokenType::QuestionQuestion, 2)
                } else {
                    simple(self, TokenType::Question, 1)
                }
            }
            b'+' => match self.peek(1) {
                b'+' => simple(self, TokenType::PlusPlus, 2),
                b'?' => simple(self, TokenType::PlusQuestion, 2),
                _ => simple(self, TokenType::Plus, 1),
            },
            b'*' => match self.peek(1) {
                b'+' => simple(self, TokenType::StarPlus, 2),
                b'?' => simple(self, TokenType::StarQuestion, 2),
                _ => simple(self, TokenType::Star, 1),
            },
            b'#' => match self.peek(1) {
                b'?' => simple(self, TokenType::HashQuestion, 2),
                b'{' => simple(self, TokenType::HashLBrace, 2),
                b'(' => self.lex_guard(start),
                _ => Err(self.error(ParseErrorKind::UnexpectedChar('#'), start)),
            },
            b'"' => self.lex_string(start),
            b'/' => self.lex_regex(start),
            b'-' if self.peek(1).is_ascii_digit() => self.lex_number(start),
            b'0'..=b'9' => self.lex_number(start),
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.lex_word(start),
            other => Err(self.error(ParseErrorKind::UnexpectedChar(other as char), start)),
        }
    }

    fn lex_word(&mut self, start: usize) -> ParseResult<Token> {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let word = &self.source[start..self.pos];
        let ty = match word {
            "_" => TokenType::Any,
            "true" => TokenType::Bool(true),
            "false" => TokenType::Bool(false),
            "null" => TokenType::Null,
            // Reserved spelling of '%'
            "remainder" => TokenType::Remainder,
            _ => TokenType::Id(self.names.intern(word)),
        };
        Ok(Token::new(ty, Span::new(start, self.pos)))
    }

    fn lex_number(&mut self, start: usize) -> ParseResult<Token> {
        if self.bytes[self.pos] == b'-' {
            self.pos += 1;
        }
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos < self.bytes.len() && self.bytes[self.pos] == b'.' && self.peek(1).is_ascii_digit() {
            self.pos += 1;
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        if self.pos < self.bytes.len() && (self.bytes[self.pos] | 0x20) == b'e' {
            let mark = self.pos;
            self.pos += 1;
            if self.pos < self.bytes.len() && (self.bytes[self.pos] == b'+' || self.bytes[self.pos] == b'-') {
                self.pos += 1;
            }
            if self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            } else {
                // Not an exponent after all; 'e' starts the next word.
                self.pos = mark;
            }
        }
        let text = &self.source[start..self.pos];
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(ParseErrorKind::InvalidNumber, start))?;
        Ok(Token::new(TokenType::Num(value), Span::new(start, self.pos)))
    }

    fn lex_string(&mut self, start: usize) -> ParseResult<Token> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            if self.pos >= self.bytes.len() {
                return Err(self.error(ParseErrorKind::UnterminatedString, start));
            }
            match self.bytes[self.pos] {
                b'"' => {
                    self.pos += 1;
                    return Ok(Token::new(TokenType::Str(out), Span::new(start, self.pos)));
                }
                b'\\' => {
                    self.pos += 1;
                    if self.pos >= self.bytes.len() {
                        return Err(self.error(ParseErrorKind::UnterminatedString, start));
                    }
                    let esc = self.bytes[self.pos];
                    self.pos += 1;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'n' => out.push('\n'),
                        b't' => out.push('\t'),
                        b'r' => out.push('\r'),
                        b'b' => out.push('\u{0008}'),
                        b'f' => out.push('\u{000C}'),
                        b'u' => out.push(self.lex_unicode_escape(start)?),
                        other => {
                            return Err(self.error(ParseErrorKind::InvalidEscape(other as char), start))
                        }
                    }
                }
                _ => {
                    // Consume one UTF-8 scalar, not one byte.
                    let rest = &self.source[self.pos..];
                    let c = rest.chars().next().unwrap();
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn lex_unicode_escape(&mut self, start: usize) -> ParseResult<char> {
        if self.pos + 4 > self.bytes.len() {
            return Err(self.error(ParseErrorKind::InvalidUnicodeEscape, start));
        }
        let hex = &self.source[self.pos..self.pos + 4];
        let code = u32::from_str_radix(hex, 16)
            .map_err(|_| self.error(ParseErrorKind::InvalidUnicodeEscape, start))?;
        self.pos += 4;
        char::from_u32(code).ok_or_else(|| self.error(ParseErrorKind::InvalidUnicodeEscape, start))
    }

    fn lex_regex(&mut self, start: usize) -> ParseResult<Token> {
        self.pos += 1; // opening slash
        let body_start = self.pos;
        loop {
            if self.pos >= self.bytes.len() {
                return Err(self.error(ParseErrorKind::UnterminatedRegex, start));
            }
            match self.bytes[self.pos] {
                b'/' => break,
                b'\\' => {
                    if self.pos + 1 >= self.bytes.len() {
                        return Err(self.error(ParseErrorKind::UnterminatedRegex, start));
                    }
                    self.pos += 2;
                }
                b'\n' => return Err(self.error(ParseErrorKind::UnterminatedRegex, start)),
                _ => self.pos += 1,
            }
        }
        let source = self.source[body_start..self.pos].to_string();
        self.pos += 1; // closing slash

        let mut flags = RegexFlags::default();
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_alphabetic() {
            let flag = self.bytes[self.pos] as char;
            match flag {
                'i' => flags.ignore_case = true,
                'm' => flags.multi_line = true,
                's' => flags.dot_all = true,
                'u' => flags.unicode = true,
                'y' => flags.sticky = true,
                other => return Err(self.error(ParseErrorKind::UnknownRegexFlag(other), self.pos)),
            }
            self.pos += 1;
        }
        Ok(Token::new(
            TokenType::Regex { source, flags },
            Span::new(start, self.pos),
        ))
    }

    /// Captures the raw text of `#( … )` up to the balancing paren. The
    /// guard mini-language has its own parser; strings inside the guard
    /// may contain parens and are skipped opaquely here.
    fn lex_guard(&mut self, start: usize) -> ParseResult<Token> {
        self.pos += 2; // '#('
        let body_start = self.pos;
        let mut depth = 1usize;
        loop {
            if self.pos >= self.bytes.len() {
                return Err(self.error(ParseErrorKind::UnterminatedGuard, start));
            }
            match self.bytes[self.pos] {
                b'(' => {
                    depth += 1;
                    self.pos += 1;
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = self.source[body_start..self.pos].to_string();
                        self.pos += 1;
                        return Ok(Token::new(
                            TokenType::Guard(body),
                            Span::new(start, self.pos),
                        ));
                    }
                    self.pos += 1;
                }
                b'"' => {
                    self.pos += 1;
                    loop {
                        if self.pos >= self.bytes.len() {
                            return Err(self.error(ParseErrorKind::UnterminatedGuard, start));
                        }
                        match self.bytes[self.pos] {
                            b'"' => {
                                self.pos += 1;
                                break;
                            }
                            b'\\' => self.pos += 2,
                            _ => self.pos += 1,
                        }
                    }
                }
                _ => self.pos += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenType> {
        let mut names = NameTable::new();
        Lexer::new(src, &mut names)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.ty)
            .collect()
    }

    #[test]
    fn punctuation_greediness() {
        assert_eq!(
            kinds(":> .. ?? +? ++ *? *+ #? #{"),
            vec![
                TokenType::ColonImply,
                TokenType::DotDot,
                TokenType::QuestionQuestion,
                TokenType::PlusQuestion,
                TokenType::PlusPlus,
                TokenType::StarQuestion,
                TokenType::StarPlus,
                TokenType::HashQuestion,
                TokenType::HashLBrace,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn lookahead_openers() {
        assert_eq!(
            kinds("(?= (?! ("),
            vec![
                TokenType::LookAhead,
                TokenType::LookAheadNeg,
                TokenType::LParen,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_words() {
        let ts = kinds("true false null remainder _ port");
        assert_eq!(ts[0], TokenType::Bool(true));
        assert_eq!(ts[1], TokenType::Bool(false));
        assert_eq!(ts[2], TokenType::Null);
        assert_eq!(ts[3], TokenType::Remainder);
        assert_eq!(ts[4], TokenType::Any);
        assert!(matches!(ts[5], TokenType::Id(_)));
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("3")[0], TokenType::Num(3.0));
        assert_eq!(kinds("-2.5")[0], TokenType::Num(-2.5));
        assert_eq!(kinds("1e3")[0], TokenType::Num(1000.0));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\nA""#)[0],
            TokenType::Str("a\"b\nA".to_string())
        );
    }

    #[test]
    fn regex_with_flags() {
        match &kinds("/^p/i")[0] {
            TokenType::Regex { source, flags } => {
                assert_eq!(source, "^p");
                assert!(flags.ignore_case);
                assert!(!flags.sticky);
            }
            other => panic!("expected regex, got {:?}", other),
        }
    }

    #[test]
    fn guard_capture_balances_parens_and_strings() {
        assert_eq!(
            kinds(r#"#(size($x) > (1 + 2) && $y == ")")"#)[0],
            TokenType::Guard(r#"size($x) > (1 + 2) && $y == ")""#.to_string())
        );
    }

    #[test]
    fn unterminated_string_errors() {
        let mut names = NameTable::new();
        let err = Lexer::new("\"abc", &mut names).tokenize().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
    }
}
