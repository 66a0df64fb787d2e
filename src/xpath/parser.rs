//! Recursive-descent parser producing the expression AST.
//!
//! Namespace prefixes are resolved and function calls are checked against the
//! dialect's function library while parsing, so a successfully parsed
//! expression only fails at evaluation time on unbound variables.

use crate::core::error::{XPathError, XPathResult};
use crate::xpath::functions;
use crate::xpath::lexer::{Token, TokenKind};
use crate::xpath::{StaticContext, MAX_DEPTH};

/// Parsed XPath expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `a or b`
    Or(Box<Expr>, Box<Expr>),
    /// `a and b`
    And(Box<Expr>, Box<Expr>),
    /// `=`, `!=`, `<`, `<=`, `>`, `>=`
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    /// `+`, `-`, `*`, `div`, `mod`
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    /// Unary minus
    Negate(Box<Expr>),
    /// `a | b`
    Union(Box<Expr>, Box<Expr>),
    /// Location path, possibly starting from a filter expression
    Path(PathExpr),
    /// Primary expression followed by predicates
    Filter(Box<Expr>, Vec<Expr>),
    /// String literal
    Literal(String),
    /// Numeric literal
    Number(f64),
    /// `$name`
    Variable(String),
    /// Function call
    Function(String, Vec<Expr>),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `div`
    Div,
    /// `mod`
    Mod,
}

/// A location path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    /// Where the path starts
    pub start: PathStart,
    /// Steps applied in order
    pub steps: Vec<Step>,
}

/// Starting point of a location path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    /// The document node
    Root,
    /// The context node
    Context,
    /// The node-set produced by a filter expression
    Expr(Box<Expr>),
}

/// One location step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Axis to walk
    pub axis: Axis,
    /// Node test applied to the axis
    pub test: NodeTest,
    /// Predicates applied in order
    pub predicates: Vec<Expr>,
}

impl Step {
    /// `descendant-or-self::node()`, the expansion of `//`.
    pub fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

/// XPath axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// `child::`
    Child,
    /// `descendant::`
    Descendant,
    /// `descendant-or-self::`
    DescendantOrSelf,
    /// `parent::`
    Parent,
    /// `ancestor::`
    Ancestor,
    /// `ancestor-or-self::`
    AncestorOrSelf,
    /// `following-sibling::`
    FollowingSibling,
    /// `preceding-sibling::`
    PrecedingSibling,
    /// `following::`
    Following,
    /// `preceding::`
    Preceding,
    /// `attribute::`
    Attribute,
    /// `namespace::`
    Namespace,
    /// `self::`
    SelfAxis,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "attribute" => Axis::Attribute,
            "namespace" => Axis::Namespace,
            "self" => Axis::SelfAxis,
            _ => return None,
        })
    }

    /// Reverse axes number their proximity positions backwards.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }
}

/// Node tests. Names carry the resolved namespace URI.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// A qualified name
    Name {
        /// Resolved namespace, `None` for unprefixed names
        namespace: Option<String>,
        /// Local name
        local: String,
    },
    /// `*`
    Wildcard,
    /// `prefix:*`, carrying the resolved namespace
    NamespaceWildcard(String),
    /// `node()`
    Node,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()` with an optional target
    ProcessingInstruction(Option<String>),
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "node" | "text" | "comment" | "processing-instruction")
}

/// Parser for converting tokens into an AST
pub struct Parser<'c> {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    context: &'c StaticContext,
}

impl<'c> Parser<'c> {
    /// Create a parser over a token list ending in [`TokenKind::Eof`].
    pub fn new(tokens: Vec<Token>, context: &'c StaticContext) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            context,
        }
    }

    /// Parse the whole token stream as one expression.
    pub fn parse(mut self) -> XPathResult<Expr> {
        let expr = self.parse_expr()?;
        match self.current() {
            TokenKind::Eof => Ok(expr),
            other => Err(self.error(format!("unexpected {:?} after expression", other))),
        }
    }

    fn parse_expr(&mut self) -> XPathResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(XPathError::DepthExceeded(MAX_DEPTH));
        }
        let expr = self.parse_or();
        self.depth -= 1;
        expr
    }

    fn parse_or(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.current() {
                TokenKind::Equal => CompareOp::Eq,
                TokenKind::NotEqual => CompareOp::Ne,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current() {
                TokenKind::Less => CompareOp::Lt,
                TokenKind::LessEqual => CompareOp::Le,
                TokenKind::Greater => CompareOp::Gt,
                TokenKind::GreaterEqual => CompareOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                TokenKind::Multiply => ArithOp::Mul,
                TokenKind::Div => ArithOp::Div,
                TokenKind::Mod => ArithOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> XPathResult<Expr> {
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> XPathResult<Expr> {
        let mut left = self.parse_path()?;
        while self.eat(&TokenKind::Pipe) {
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_path(&mut self) -> XPathResult<Expr> {
        match self.current() {
            TokenKind::Slash => {
                self.advance();
                let steps = if self.starts_step() {
                    self.parse_relative_path()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path(PathExpr {
                    start: PathStart::Root,
                    steps,
                }))
            }
            TokenKind::DoubleSlash => {
                self.advance();
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_path()?);
                Ok(Expr::Path(PathExpr {
                    start: PathStart::Root,
                    steps,
                }))
            }
            _ if self.starts_primary() => {
                let primary = self.parse_filter()?;
                let mut steps = Vec::new();
                match self.current() {
                    TokenKind::Slash => {
                        self.advance();
                    }
                    TokenKind::DoubleSlash => {
                        self.advance();
                        steps.push(Step::descendant_or_self());
                    }
                    _ => return Ok(primary),
                }
                steps.extend(self.parse_relative_path()?);
                Ok(Expr::Path(PathExpr {
                    start: PathStart::Expr(Box::new(primary)),
                    steps,
                }))
            }
            _ => {
                let steps = self.parse_relative_path()?;
                Ok(Expr::Path(PathExpr {
                    start: PathStart::Context,
                    steps,
                }))
            }
        }
    }

    fn parse_filter(&mut self) -> XPathResult<Expr> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        if predicates.is_empty() {
            Ok(primary)
        } else {
            Ok(Expr::Filter(Box::new(primary), predicates))
        }
    }

    fn parse_primary(&mut self) -> XPathResult<Expr> {
        match self.current().clone() {
            TokenKind::Variable(name) => {
                self.advance();
                Ok(Expr::Variable(name))
            }
            TokenKind::Literal(value) => {
                self.advance();
                Ok(Expr::Literal(value))
            }
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::Number(value))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::Name { prefix, local } => {
                self.advance();
                let name = match prefix {
                    Some(p) => format!("{}:{}", p, local),
                    None => local,
                };
                let args = self.parse_arguments()?;
                functions::check_call(&name, args.len(), self.context.dialect)?;
                Ok(Expr::Function(name, args))
            }
            other => Err(self.error(format!("unexpected {:?}", other))),
        }
    }

    fn parse_arguments(&mut self) -> XPathResult<Vec<Expr>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::RightParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::RightParen)?;
            return Ok(args);
        }
    }

    fn parse_relative_path(&mut self) -> XPathResult<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        loop {
            match self.current() {
                TokenKind::Slash => {
                    self.advance();
                }
                TokenKind::DoubleSlash => {
                    self.advance();
                    steps.push(Step::descendant_or_self());
                }
                _ => return Ok(steps),
            }
            steps.push(self.parse_step()?);
        }
    }

    fn parse_step(&mut self) -> XPathResult<Step> {
        if self.eat(&TokenKind::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&TokenKind::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&TokenKind::At) {
            Axis::Attribute
        } else if let (TokenKind::Name { prefix: None, local }, TokenKind::ColonColon) =
            (self.current(), self.peek())
        {
            let axis = Axis::from_name(local)
                .ok_or_else(|| self.error(format!("unknown axis '{}'", local)))?;
            self.advance();
            self.advance();
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step { axis, test, predicates })
    }

    fn parse_node_test(&mut self) -> XPathResult<NodeTest> {
        let TokenKind::Name { prefix, local } = self.current().clone() else {
            return Err(self.error(format!("expected a node test, found {:?}", self.current())));
        };
        self.advance();

        if prefix.is_none() && is_node_type(&local) && self.current() == &TokenKind::LeftParen {
            self.advance();
            let test = match local.as_str() {
                "node" => NodeTest::Node,
                "text" => NodeTest::Text,
                "comment" => NodeTest::Comment,
                _ => match self.current().clone() {
                    TokenKind::Literal(target) => {
                        self.advance();
                        NodeTest::ProcessingInstruction(Some(target))
                    }
                    _ => NodeTest::ProcessingInstruction(None),
                },
            };
            self.expect(&TokenKind::RightParen)?;
            return Ok(test);
        }

        match (prefix, local.as_str()) {
            (None, "*") => Ok(NodeTest::Wildcard),
            (Some(p), "*") => Ok(NodeTest::NamespaceWildcard(self.resolve_prefix(&p)?)),
            (None, _) => Ok(NodeTest::Name {
                namespace: None,
                local,
            }),
            (Some(p), _) => Ok(NodeTest::Name {
                namespace: Some(self.resolve_prefix(&p)?),
                local,
            }),
        }
    }

    fn parse_predicates(&mut self) -> XPathResult<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&TokenKind::LeftBracket) {
            predicates.push(self.parse_expr()?);
            self.expect(&TokenKind::RightBracket)?;
        }
        Ok(predicates)
    }

    fn resolve_prefix(&self, prefix: &str) -> XPathResult<String> {
        self.context
            .namespace(prefix)
            .map(str::to_string)
            .ok_or_else(|| XPathError::UnknownPrefix(prefix.to_string()))
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.current(),
            TokenKind::Dot | TokenKind::DotDot | TokenKind::At | TokenKind::Name { .. }
        )
    }

    fn starts_primary(&self) -> bool {
        match self.current() {
            TokenKind::Variable(_) | TokenKind::Literal(_) | TokenKind::Number(_) | TokenKind::LeftParen => true,
            TokenKind::Name { prefix, local } => {
                local != "*"
                    && self.peek() == &TokenKind::LeftParen
                    && !(prefix.is_none() && is_node_type(local))
            }
            _ => false,
        }
    }

    fn current(&self) -> &TokenKind {
        self.tokens
            .get(self.position)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.position + 1)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.current() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> XPathResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", kind, self.current())))
        }
    }

    fn error(&self, message: String) -> XPathError {
        let position = self
            .tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.position);
        XPathError::syntax(position, message)
    }
}
