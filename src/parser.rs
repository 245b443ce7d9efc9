use crate::ast::*;
use crate::config::Config;
use crate::error::{SyntaxError, TemplateSource};
use crate::lexer::{Spanned, Token, Tokenizer};

pub struct Parser<'a> {
    lexer: Tokenizer<'a>,
    source: &'a TemplateSource,
    config: &'a Config,
    /// One token of expression lookahead. Must be empty whenever the lexer is
    /// driven in text or character mode.
    peeked: Option<Spanned>,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a TemplateSource, config: &'a Config) -> Self {
        Self {
            lexer: Tokenizer::new(source),
            source,
            config,
            peeked: None,
            depth: 0,
        }
    }

    fn error(&self, span: Span, message: impl Into<String>, expected: Option<&str>) -> SyntaxError {
        SyntaxError::new(self.source, span, message, expected.map(str::to_string))
    }

    fn unexpected(&self, found: &Spanned, expected: &str) -> SyntaxError {
        self.error(found.span, format!("unexpected {}", found.token), Some(expected))
    }

    fn peek(&mut self) -> Result<&Spanned, SyntaxError> {
        let spanned = match self.peeked.take() {
            Some(spanned) => spanned,
            None => self.lexer.next_expr()?,
        };
        Ok(self.peeked.insert(spanned))
    }

    fn peek_is(&mut self, token: &Token) -> Result<bool, SyntaxError> {
        Ok(self.peek()?.token == *token)
    }

    fn consume(&mut self) -> Result<Spanned, SyntaxError> {
        match self.peeked.take() {
            Some(spanned) => Ok(spanned),
            None => self.lexer.next_expr(),
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<Spanned, SyntaxError> {
        let found = self.consume()?;
        if found.token == token {
            Ok(found)
        } else {
            Err(self.unexpected(&found, expected))
        }
    }

    pub fn parse(&mut self) -> Result<Vec<Node>, SyntaxError> {
        let mut nodes = Vec::new();
        while let Some(spanned) = self.lexer.next_text()? {
            match spanned.token {
                Token::Text(text) => match nodes.last_mut() {
                    // Comments can split a run of text; keep it whole.
                    Some(Node::Text(prev)) => prev.push_str(&text),
                    _ => nodes.push(Node::Text(text)),
                },
                Token::Comment => {}
                Token::Directive(name) => nodes.push(self.parse_directive(&name, spanned.span)?),
                Token::Reference { braced } => {
                    let reference = self.parse_reference(braced, spanned.span.start)?;
                    nodes.push(Node::Reference(reference));
                }
                _ => return Err(self.unexpected(&spanned, "template text")),
            }
        }
        tracing::debug!(name = self.source.name(), nodes = nodes.len(), "parsed template");
        Ok(nodes)
    }

    fn parse_directive(&mut self, name: &str, span: Span) -> Result<Node, SyntaxError> {
        match name {
            "set" => self.parse_set(span),
            _ => Err(self.error(span, format!("unknown directive `#{name}`"), None)),
        }
    }

    fn parse_set(&mut self, start: Span) -> Result<Node, SyntaxError> {
        self.expect(Token::LParen, "`(` after `#set`")?;

        let dollar = self.consume()?;
        let Token::Reference { braced } = dollar.token else {
            return Err(self.unexpected(&dollar, "a `$` reference to assign to"));
        };
        let target = self.parse_reference(braced, dollar.span.start)?;
        if !target.steps.is_empty() {
            return Err(self.error(
                target.span,
                "assignment target must be a plain variable",
                Some(&format!("`${}`", target.name)),
            ));
        }

        self.expect(Token::Assign, "`=`")?;
        let value = self.parse_expr()?;
        let close = self.expect(Token::RParen, "`)`")?;

        if self.config.trim_directive_newlines {
            self.lexer.skip_newline();
        }
        Ok(Node::Directive(Directive::Set {
            target: target.name,
            value,
            span: start.to(close.span),
        }))
    }

    /// The rest of a reference whose `$` (or `${`) ends just before the
    /// lexer's cursor. Whitespace ends the chain.
    fn parse_reference(&mut self, braced: bool, start: usize) -> Result<Reference, SyntaxError> {
        debug_assert!(self.peeked.is_none());
        let Some((name, _)) = self.lexer.ident() else {
            let here = Span::new(start, self.lexer.cursor());
            return Err(self.error(here, "expected a variable name after `$`", Some("a name")));
        };

        let mut steps = Vec::new();
        loop {
            let step_start = self.lexer.cursor();
            let kind = match (self.lexer.peek_char(), self.lexer.peek_char_at(1)) {
                (Some('.'), Some(c)) if c.is_ascii_alphabetic() => {
                    self.lexer.eat('.');
                    let Some((member, _)) = self.lexer.ident() else {
                        break;
                    };
                    if self.lexer.eat('(') {
                        StepKind::Method(member, self.parse_args()?)
                    } else {
                        StepKind::Property(member)
                    }
                }
                (Some('['), _) => {
                    self.lexer.eat('[');
                    let key = self.parse_expr()?;
                    self.expect(Token::RBracket, "`]`")?;
                    StepKind::Index(Box::new(key))
                }
                _ => break,
            };
            steps.push(Step {
                kind,
                span: Span::new(step_start, self.lexer.cursor()),
            });
        }

        if braced && !self.lexer.eat('}') {
            let here = Span::new(start, self.lexer.cursor());
            return Err(self.error(here, "unterminated `${` reference", Some("`}`")));
        }

        Ok(Reference {
            name,
            steps,
            span: Span::new(start, self.lexer.cursor()),
        })
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn parse_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if self.peek_is(&Token::RParen)? {
            self.consume()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            let next = self.consume()?;
            match next.token {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                _ => return Err(self.unexpected(&next, "`,` or `)`")),
            }
        }
    }

    /// Run `f` one nesting level deeper, refusing to go past the limit.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= self.config.max_depth {
            let here = Span::new(self.lexer.cursor(), self.lexer.cursor());
            return Err(self.error(here, "expression nested too deeply", None));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::parse_or)
    }

    /// Build an expression node, refusing trees taller than the depth limit.
    /// Operator chains like `1+1+...` grow the tree without recursing in the
    /// parser, so `nested` alone does not bound them.
    fn build(&self, kind: ExprKind, span: Span) -> Result<Expr, SyntaxError> {
        let expr = Expr::new(kind, span);
        if expr.height > self.config.max_depth {
            return Err(self.error(span, "expression nested too deeply", None));
        }
        Ok(expr)
    }

    fn binary(&self, op: BinOp, lhs: Expr, rhs: Expr) -> Result<Expr, SyntaxError> {
        let span = lhs.span.to(rhs.span);
        self.build(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), span)
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_and()?;
        while self.peek_is(&Token::OrOr)? {
            self.consume()?;
            let rhs = self.parse_and()?;
            lhs = self.binary(BinOp::Or, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_equality()?;
        while self.peek_is(&Token::AndAnd)? {
            self.consume()?;
            let rhs = self.parse_equality()?;
            lhs = self.binary(BinOp::And, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek()?.token {
                Token::EqEq => BinOp::Eq,
                Token::NotEq => BinOp::Ne,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_relational()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek()?.token {
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Le => BinOp::Le,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_additive()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek()?.token {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_multiplicative()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek()?.token {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_unary()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek()?.token {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        let op_token = self.consume()?;

        // `-` straight onto a literal is part of the literal, which is the
        // only way to write i32::MIN.
        if op == UnaryOp::Neg {
            let literal = match self.peek()?.token {
                Token::Number(n) => Some(n),
                _ => None,
            };
            if let Some(n) = literal {
                let digits = self.consume()?;
                let span = op_token.span.to(digits.span);
                let literal = ExprKind::Number(self.int_literal(-n, span)?);
                return self.build(literal, span);
            }
        }

        let operand = self.nested(Self::parse_unary)?;
        let span = op_token.span.to(operand.span);
        self.build(ExprKind::Unary(op, Box::new(operand)), span)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.consume()?;
        let kind = match token.token {
            Token::Number(n) => ExprKind::Number(self.int_literal(n, token.span)?),
            Token::StringLit(s) => ExprKind::String(s),
            Token::True => ExprKind::Bool(true),
            Token::False => ExprKind::Bool(false),
            Token::Reference { braced } => {
                let reference = self.parse_reference(braced, token.span.start)?;
                let span = reference.span;
                return self.build(ExprKind::Reference(reference), span);
            }
            Token::LParen => {
                let inner = self.parse_expr()?;
                let close = self.expect(Token::RParen, "`)`")?;
                return self.build(inner.kind, token.span.to(close.span));
            }
            _ => return Err(self.unexpected(&token, "an expression")),
        };
        self.build(kind, token.span)
    }

    fn int_literal(&self, n: i64, span: Span) -> Result<i32, SyntaxError> {
        i32::try_from(n).map_err(|_| {
            self.error(
                span,
                format!("integer literal {n} out of range"),
                Some("a value between -2147483648 and 2147483647"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Vec<Node>, SyntaxError> {
        let source = TemplateSource::new("t", input);
        let config = Config::default();
        Parser::new(&source, &config).parse()
    }

    fn expr(input: &str) -> Expr {
        match parse(&format!("#set($x = {input})")).unwrap().remove(0) {
            Node::Directive(Directive::Set { value, .. }) => value,
            other => panic!("expected #set, got {other:?}"),
        }
    }

    /// Fully parenthesised rendering, to check tree shape.
    fn shape(e: &Expr) -> String {
        match &e.kind {
            ExprKind::Number(n) => n.to_string(),
            ExprKind::String(s) => format!("{s:?}"),
            ExprKind::Bool(b) => b.to_string(),
            ExprKind::Reference(r) => format!("${}", r.name),
            ExprKind::Unary(UnaryOp::Not, e) => format!("(!{})", shape(e)),
            ExprKind::Unary(UnaryOp::Neg, e) => format!("(-{})", shape(e)),
            ExprKind::Binary(op, l, r) => format!("({} {op} {})", shape(l), shape(r)),
        }
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(shape(&expr("1 + 2 * 3")), "(1 + (2 * 3))");
        assert_eq!(shape(&expr("10 - 3 - 2")), "((10 - 3) - 2)");
        assert_eq!(shape(&expr("1 < 2 == 3 < 4")), "((1 < 2) == (3 < 4))");
        assert_eq!(shape(&expr("!true || false && true")), "((!true) || (false && true))");
        assert_eq!(shape(&expr("not $a and $b or $c")), "(((!$a) && $b) || $c)");
        assert_eq!(shape(&expr("(1 + 2) * 3")), "((1 + 2) * 3)");
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(expr("-2147483648").kind, ExprKind::Number(i32::MIN));
        assert_eq!(shape(&expr("-$x")), "(-$x)");
        assert_eq!(shape(&expr("--1")), "(--1)");
        assert_eq!(shape(&expr("5 - -1")), "(5 - -1)");
    }

    #[test]
    fn literal_range() {
        assert_eq!(expr("2147483647").kind, ExprKind::Number(i32::MAX));
        let err = parse("#set($x = 2147483648)").unwrap_err();
        assert_eq!(err.message, "integer literal 2147483648 out of range");
        assert!(parse("#set($x = -2147483649)").is_err());
        assert!(parse("#set($x = 99999999999999999999)").is_err());
    }

    #[test]
    fn reference_chains() {
        let nodes = parse("$a.b.c($d, 'e')[1].f-g_h x").unwrap();
        let Node::Reference(r) = &nodes[0] else {
            panic!("expected reference");
        };
        assert_eq!(r.name, "a");
        assert_eq!(r.span, Span::new(0, 24));
        let kinds: Vec<&str> = r
            .steps
            .iter()
            .map(|s| match &s.kind {
                StepKind::Property(_) => "property",
                StepKind::Method(_, _) => "method",
                StepKind::Index(_) => "index",
            })
            .collect();
        assert_eq!(kinds, ["property", "method", "index", "property"]);
        assert_eq!(nodes[1], Node::Text(" x".into()));
    }

    #[test]
    fn trailing_dot_is_text() {
        let nodes = parse("$a. and $a.1").unwrap();
        assert_eq!(nodes[1], Node::Text(". and ".into()));
        assert_eq!(nodes[3], Node::Text(".1".into()));
    }

    #[test]
    fn braced_references() {
        let nodes = parse("${a.b}c").unwrap();
        let Node::Reference(r) = &nodes[0] else {
            panic!("expected reference");
        };
        assert_eq!(r.steps.len(), 1);
        assert_eq!(nodes[1], Node::Text("c".into()));

        let err = parse("${a.b c").unwrap_err();
        assert_eq!(err.message, "unterminated `${` reference");
    }

    #[test]
    fn comments_merge_text() {
        assert_eq!(
            parse("line 1 ##\n  line 2").unwrap(),
            vec![Node::Text("line 1   line 2".into())]
        );
    }

    #[test]
    fn set_swallows_one_newline() {
        let nodes = parse("#set($x = 1)\n\nafter").unwrap();
        assert_eq!(nodes[1], Node::Text("\nafter".into()));

        let source = TemplateSource::new("t", "#set($x = 1)\nafter");
        let config = Config::default().trim_directive_newlines(false);
        let nodes = Parser::new(&source, &config).parse().unwrap();
        assert_eq!(nodes[1], Node::Text("\nafter".into()));
    }

    #[test]
    fn set_requires_plain_target() {
        let err = parse("#set($x.y = 1)").unwrap_err();
        assert_eq!(err.message, "assignment target must be a plain variable");
        let err = parse("#set(x = 1)").unwrap_err();
        assert_eq!(err.message, "unexpected identifier `x`");
        assert!(parse("#set($x 1)").is_err());
        assert!(parse("#set($x = 1").is_err());
    }

    #[test]
    fn error_positions() {
        let err = parse("ok\n#set($x = 1 +)").unwrap_err();
        assert_eq!(err.message, "unexpected `)`");
        assert_eq!((err.line, err.column), (2, 14));
        assert_eq!(err.help.as_deref(), Some("expected an expression"));
    }

    #[test]
    fn depth_limit() {
        let deep = format!("#set($x = {}1{})", "(".repeat(100), ")".repeat(100));
        let err = parse(&deep).unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");
        let shallow = format!("#set($x = {}1{})", "(".repeat(20), ")".repeat(20));
        assert!(parse(&shallow).is_ok());
    }

    #[test]
    fn long_operator_chains_are_bounded() {
        let chain = vec!["1"; 100_000].join("+");
        let err = parse(&format!("#set($x = {chain})")).unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");

        let ok = vec!["1"; 60].join(" + ");
        assert_eq!(expr(&ok).height, 60);

        let keys = format!("#set($x = $m[{}])", vec!["1"; 100].join("*"));
        assert!(parse(&keys).is_err());
    }

    #[test]
    fn custom_depth_limit() {
        let source = TemplateSource::new("t", "#set($x = 1 + 2 + 3 + 4 + 5)");
        let config = Config::default().max_depth(4);
        let err = Parser::new(&source, &config).parse().unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");

        let source = TemplateSource::new("t", "#set($x = (1 + 2) * 3)");
        let nodes = Parser::new(&source, &config).parse().unwrap();
        assert_eq!(nodes.len(), 1);

        let source = TemplateSource::new("t", "#set($x = ((((((1))))))");
        assert!(Parser::new(&source, &config).parse().is_err());
    }
}
