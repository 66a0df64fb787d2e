//! Lexer for XPath expressions.
//!
//! `*` and the words `and`, `or`, `div`, `mod` are operators only when they
//! follow something that can end an operand. Elsewhere they are name tests.

use crate::core::error::{XPathError, XPathResult};

/// A token together with its byte offset in the expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token kind
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub position: usize,
}

/// The kind of token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `.`
    Dot,
    /// `..`
    DotDot,
    /// `@`
    At,
    /// `,`
    Comma,
    /// `::`
    ColonColon,
    /// `/`
    Slash,
    /// `//`
    DoubleSlash,
    /// `|`
    Pipe,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `*` as multiplication
    Multiply,
    /// `and`
    And,
    /// `or`
    Or,
    /// `div`
    Div,
    /// `mod`
    Mod,
    /// Quoted string literal
    Literal(String),
    /// Numeric literal
    Number(f64),
    /// `$name`
    Variable(String),
    /// A name or name test; `local` is `*` for wildcards.
    Name {
        /// Namespace prefix, if written
        prefix: Option<String>,
        /// Local part or `*`
        local: String,
    },
    /// End of input
    Eof,
}

impl TokenKind {
    /// Whether an operator may follow this token.
    fn ends_operand(&self) -> bool {
        !matches!(
            self,
            TokenKind::At
                | TokenKind::ColonColon
                | TokenKind::LeftParen
                | TokenKind::LeftBracket
                | TokenKind::Comma
                | TokenKind::Slash
                | TokenKind::DoubleSlash
                | TokenKind::Pipe
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::Multiply
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Div
                | TokenKind::Mod
        )
    }
}

/// Lexer for tokenizing XPath expression strings
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    previous: Option<TokenKind>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer from an input string
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            previous: None,
        }
    }

    /// Tokenize the entire input. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> XPathResult<Vec<Token>> {
        let mut tokens = Vec::with_capacity((self.input.len() / 3).max(4));
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            self.previous = Some(token.kind.clone());
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn operator_allowed(&self) -> bool {
        self.previous.as_ref().map_or(false, TokenKind::ends_operand)
    }

    fn next_token(&mut self) -> XPathResult<Token> {
        self.skip_whitespace();
        let start = self.position;
        let Some(ch) = self.current_char() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position: start,
            });
        };

        let kind = match ch {
            '(' => self.single(TokenKind::LeftParen),
            ')' => self.single(TokenKind::RightParen),
            '[' => self.single(TokenKind::LeftBracket),
            ']' => self.single(TokenKind::RightBracket),
            '@' => self.single(TokenKind::At),
            ',' => self.single(TokenKind::Comma),
            '|' => self.single(TokenKind::Pipe),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '=' => self.single(TokenKind::Equal),
            '!' if self.peek() == Some('=') => self.double(TokenKind::NotEqual),
            '<' if self.peek() == Some('=') => self.double(TokenKind::LessEqual),
            '<' => self.single(TokenKind::Less),
            '>' if self.peek() == Some('=') => self.double(TokenKind::GreaterEqual),
            '>' => self.single(TokenKind::Greater),
            ':' if self.peek() == Some(':') => self.double(TokenKind::ColonColon),
            '/' if self.peek() == Some('/') => self.double(TokenKind::DoubleSlash),
            '/' => self.single(TokenKind::Slash),
            '.' if self.peek() == Some('.') => self.double(TokenKind::DotDot),
            '.' if self.peek().map_or(false, |c| c.is_ascii_digit()) => self.number(),
            '.' => self.single(TokenKind::Dot),
            '*' if self.operator_allowed() => self.single(TokenKind::Multiply),
            '*' => self.single(TokenKind::Name {
                prefix: None,
                local: "*".to_string(),
            }),
            '"' | '\'' => self.literal(ch)?,
            '$' => {
                self.advance();
                let name = self.qname_text();
                if name.is_empty() {
                    return Err(XPathError::syntax(start, "expected a variable name after '$'"));
                }
                TokenKind::Variable(name)
            }
            c if c.is_ascii_digit() => self.number(),
            c if is_name_start(c) => self.name(),
            c => return Err(XPathError::syntax(start, format!("unexpected character '{}'", c))),
        };

        Ok(Token { kind, position: start })
    }

    fn name(&mut self) -> TokenKind {
        let first = self.ncname();
        if self.operator_allowed() {
            match first.as_str() {
                "and" => return TokenKind::And,
                "or" => return TokenKind::Or,
                "div" => return TokenKind::Div,
                "mod" => return TokenKind::Mod,
                _ => {}
            }
        }

        // prefix:local or prefix:*, but never the axis separator.
        if self.current_char() == Some(':') && self.peek() != Some(':') {
            match self.peek() {
                Some('*') => {
                    self.advance();
                    self.advance();
                    return TokenKind::Name {
                        prefix: Some(first),
                        local: "*".to_string(),
                    };
                }
                Some(c) if is_name_start(c) => {
                    self.advance();
                    let local = self.ncname();
                    return TokenKind::Name {
                        prefix: Some(first),
                        local,
                    };
                }
                _ => {}
            }
        }

        TokenKind::Name {
            prefix: None,
            local: first,
        }
    }

    /// A possibly-prefixed name as plain text, used for variable references.
    fn qname_text(&mut self) -> String {
        if !self.current_char().map_or(false, is_name_start) {
            return String::new();
        }
        let mut name = self.ncname();
        if self.current_char() == Some(':') && self.peek().map_or(false, is_name_start) {
            self.advance();
            name.push(':');
            name.push_str(&self.ncname());
        }
        name
    }

    fn ncname(&mut self) -> String {
        let start = self.position;
        while let Some(c) = self.current_char() {
            if is_name_char(c) {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.position].to_string()
    }

    fn number(&mut self) -> TokenKind {
        let start = self.position;
        while self.current_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.current_char() == Some('.') {
            self.advance();
            while self.current_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        // Only digits and one dot were consumed, so parsing cannot fail.
        TokenKind::Number(self.input[start..self.position].parse().unwrap_or(f64::NAN))
    }

    fn literal(&mut self, quote: char) -> XPathResult<TokenKind> {
        let start = self.position;
        self.advance();
        let body_start = self.position;
        while let Some(c) = self.current_char() {
            if c == quote {
                let body = self.input[body_start..self.position].to_string();
                self.advance();
                return Ok(TokenKind::Literal(body));
            }
            self.advance();
        }
        Err(XPathError::syntax(start, "unterminated string literal"))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        self.advance();
        kind
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().map_or(false, |c| matches!(c, ' ' | '\t' | '\r' | '\n')) {
            self.advance();
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek(&self) -> Option<char> {
        let mut chars = self.input[self.position..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current_char() {
            self.position += c.len_utf8();
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}
