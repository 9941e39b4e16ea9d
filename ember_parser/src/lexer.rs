//! Hand-rolled cursor lexer.
//!
//! Single forward pass over the source bytes; every token carries its byte
//! span. `//` comments run to end of line. The only lookahead subtlety is
//! `1..5`: a `.` after digits only starts a decimal part when the following
//! byte is itself a digit, so range dots are never swallowed.

use crate::token::{Token, TokenKind};
use ember_core::{EmberError, EmberResult, Span};
use std::sync::Arc;

/// Streaming lexer over source text.
pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
}

impl<'src> Lexer<'src> {
    /// Create a lexer over `source`.
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the whole input, appending a trailing `Eof` token.
    pub fn tokenize(mut self) -> EmberResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn peek2(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    #[inline]
    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.pos += 1;
                }
                Some(b'/') if self.peek2() == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> EmberResult<Token> {
        self.skip_trivia();
        let start = self.pos as u32;

        let Some(b) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, Span::new(start, start)));
        };

        let kind = match b {
            b'0'..=b'9' => return self.lex_number(),
            b'"' => return self.lex_string(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => return Ok(self.lex_word()),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'[' => self.single(TokenKind::LBracket),
            b']' => self.single(TokenKind::RBracket),
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b',' => self.single(TokenKind::Comma),
            b';' => self.single(TokenKind::Semi),
            b':' => self.single(TokenKind::Colon),
            b'+' => self.single(TokenKind::Plus),
            b'-' => self.single(TokenKind::Minus),
            b'*' => self.single(TokenKind::Star),
            b'/' => self.single(TokenKind::Slash),
            b'%' => self.single(TokenKind::Percent),
            b'#' if self.peek2() == Some(b'{') => {
                self.pos += 2;
                TokenKind::HashBrace
            }
            b'.' if self.peek2() == Some(b'.') => {
                self.pos += 2;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::DotDotEq
                } else {
                    TokenKind::DotDot
                }
            }
            b'|' => {
                self.pos += 1;
                match self.peek() {
                    Some(b'|') => {
                        self.pos += 1;
                        TokenKind::PipePipe
                    }
                    Some(b'>') => {
                        self.pos += 1;
                        TokenKind::PipeGt
                    }
                    _ => TokenKind::Pipe,
                }
            }
            b'&' if self.peek2() == Some(b'&') => {
                self.pos += 2;
                TokenKind::AmpAmp
            }
            b'=' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::BangEq
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                self.pos += 1;
                match self.peek() {
                    Some(b'=') => {
                        self.pos += 1;
                        TokenKind::Ge
                    }
                    Some(b'>') => {
                        self.pos += 1;
                        TokenKind::GtGt
                    }
                    _ => TokenKind::Gt,
                }
            }
            other => {
                return Err(EmberError::Lex {
                    message: format!("unexpected character `{}`", other as char),
                    span: Span::new(start, start + 1),
                });
            }
        };

        Ok(Token::new(kind, Span::new(start, self.pos as u32)))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn lex_number(&mut self) -> EmberResult<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }

        // A decimal part only when `.` is followed by a digit; `1..5` stays
        // an integer plus a range operator.
        let mut is_decimal = false;
        if self.peek() == Some(b'.') && matches!(self.peek2(), Some(b'0'..=b'9')) {
            is_decimal = true;
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }

        let span = Span::new(start as u32, self.pos as u32);
        let text = &self.source[start..self.pos];
        let kind = if is_decimal {
            match text.parse::<f64>() {
                Ok(n) => TokenKind::Decimal(n),
                Err(_) => {
                    return Err(EmberError::Lex {
                        message: format!("invalid decimal literal `{text}`"),
                        span,
                    });
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => TokenKind::Int(n),
                Err(_) => {
                    return Err(EmberError::Lex {
                        message: format!("integer literal `{text}` out of range"),
                        span,
                    });
                }
            }
        };
        Ok(Token::new(kind, span))
    }

    fn lex_string(&mut self) -> EmberResult<Token> {
        let start = self.pos as u32;
        self.pos += 1; // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(EmberError::Lex {
                        message: "unterminated string literal".to_string(),
                        span: Span::new(start, self.pos as u32),
                    });
                }
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => value.push('\n'),
                    Some(b't') => value.push('\t'),
                    Some(b'r') => value.push('\r'),
                    Some(b'"') => value.push('"'),
                    Some(b'\\') => value.push('\\'),
                    other => {
                        return Err(EmberError::Lex {
                            message: format!(
                                "unknown escape `\\{}`",
                                other.map_or(String::new(), |c| (c as char).to_string())
                            ),
                            span: Span::new(self.pos as u32 - 2, self.pos as u32),
                        });
                    }
                },
                Some(b) => {
                    // Multi-byte UTF-8 sequences pass through unmodified.
                    if b.is_ascii() {
                        value.push(b as char);
                    } else {
                        let rest = &self.source[self.pos - 1..];
                        let ch = rest.chars().next().unwrap_or('\u{FFFD}');
                        value.push(ch);
                        self.pos += ch.len_utf8() - 1;
                    }
                }
            }
        }
        Ok(Token::new(
            TokenKind::Str(Arc::from(value.as_str())),
            Span::new(start, self.pos as u32),
        ))
    }

    fn lex_word(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')) {
            self.pos += 1;
        }
        let span = Span::new(start as u32, self.pos as u32);
        let text = &self.source[start..self.pos];
        let kind = match text {
            "_" => TokenKind::Placeholder,
            "let" => TokenKind::Let,
            "mut" => TokenKind::Mut,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "match" => TokenKind::Match,
            "return" => TokenKind::Return,
            "break" => TokenKind::Break,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            name => TokenKind::Ident(Arc::from(name)),
        };
        Token::new(kind, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .expect("lex error")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_numbers_and_ranges() {
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Int(1),
                TokenKind::DotDot,
                TokenKind::Int(5),
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("1.5"),
            vec![TokenKind::Decimal(1.5), TokenKind::Eof]
        );
        assert_eq!(
            kinds("1..=5"),
            vec![
                TokenKind::Int(1),
                TokenKind::DotDotEq,
                TokenKind::Int(5),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_placeholder_vs_identifier() {
        assert_eq!(kinds("_"), vec![TokenKind::Placeholder, TokenKind::Eof]);
        assert_eq!(
            kinds("_x"),
            vec![TokenKind::Ident(Arc::from("_x")), TokenKind::Eof]
        );
    }

    #[test]
    fn test_pipe_family() {
        assert_eq!(
            kinds("| || |> >>"),
            vec![
                TokenKind::Pipe,
                TokenKind::PipePipe,
                TokenKind::PipeGt,
                TokenKind::GtGt,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::Str(Arc::from("a\nb")), TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_are_trivia() {
        assert_eq!(
            kinds("1 // ignored\n2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_dict_opener() {
        assert_eq!(
            kinds("#{}"),
            vec![TokenKind::HashBrace, TokenKind::RBrace, TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert_eq!(err.kind(), "LexError");
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("a ~ b").tokenize().unwrap_err();
        assert_eq!(err.kind(), "LexError");
    }
}
