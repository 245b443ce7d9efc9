use crate::ast::Span;
use crate::error::{SyntaxError, TemplateSource};
use std::fmt;

/// Directives the parser understands; any other `#name` is literal text.
const DIRECTIVES: &[&str] = &["set"];

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Template level
    Text(String),
    Comment,
    Directive(String),         // #set, #{set}
    Reference { braced: bool }, // $, ${

    // Keywords
    True,
    False,

    // Operators
    OrOr,    // || or
    AndAnd,  // && and
    EqEq,    // == eq
    NotEq,   // != ne
    Lt,      // < lt
    Gt,      // > gt
    Le,      // <= le
    Ge,      // >= ge
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %
    Bang,    // ! not
    Assign,  // =

    // Symbols
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    RBrace,   // }
    Comma,    // ,
    Dot,      // .

    // Data
    Ident(String),
    Number(i64),
    StringLit(String),

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Token::Text(_) => return f.write_str("text"),
            Token::Comment => return f.write_str("comment"),
            Token::Directive(name) => return write!(f, "directive `#{name}`"),
            Token::Reference { .. } => return f.write_str("reference"),
            Token::Ident(name) => return write!(f, "identifier `{name}`"),
            Token::Number(n) => return write!(f, "number `{n}`"),
            Token::StringLit(s) => return write!(f, "string \"{s}\""),
            Token::Eof => return f.write_str("end of input"),
            Token::True => "true",
            Token::False => "false",
            Token::OrOr => "||",
            Token::AndAnd => "&&",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::Assign => "=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Dot => ".",
        };
        write!(f, "`{symbol}`")
    }
}

/// A token and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Splits template text into tokens on demand.
///
/// The template language is context-sensitive, so the parser picks the mode:
/// [`Tokenizer::next_text`] outside expressions, [`Tokenizer::next_expr`]
/// inside `#set(...)`, argument lists and index brackets, and the
/// character-level helpers while walking a `$reference` chain, where
/// whitespace is significant.
#[derive(Clone)]
pub struct Tokenizer<'a> {
    source: &'a TemplateSource,
    input: &'a str,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a TemplateSource) -> Self {
        Self {
            source,
            input: source.text(),
            cursor: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn spanned(&self, token: Token, start: usize) -> Spanned {
        Spanned {
            token,
            span: Span::new(start, self.cursor),
        }
    }

    fn error(&self, span: Span, message: impl Into<String>, expected: Option<&str>) -> SyntaxError {
        SyntaxError::new(self.source, span, message, expected.map(str::to_string))
    }

    pub fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    pub fn peek_char_at(&self, n: usize) -> Option<char> {
        self.remaining().chars().nth(n)
    }

    /// Consume `c` if it is next.
    pub fn eat(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.advance(c.len_utf8());
            true
        } else {
            false
        }
    }

    /// A variable or member name: an ASCII letter, then ASCII letters,
    /// digits, `-` or `_`. Stops before anything else, non-ASCII included.
    pub fn ident(&mut self) -> Option<(String, Span)> {
        let rest = self.remaining();
        if !rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return None;
        }
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        let start = self.cursor;
        self.advance(len);
        Some((rest[..len].to_string(), Span::new(start, self.cursor)))
    }

    /// Swallow one line ending, if the cursor sits on one.
    pub fn skip_newline(&mut self) {
        let rest = self.remaining();
        if rest.starts_with('\n') {
            self.advance(1);
        } else if rest.starts_with("\r\n") {
            self.advance(2);
        }
    }

    /// Next token outside any expression; `None` at end of input.
    pub fn next_text(&mut self) -> Result<Option<Spanned>, SyntaxError> {
        let rest = self.remaining();
        if rest.is_empty() {
            return Ok(None);
        }
        let start = self.cursor;

        // `##` runs to the end of the line and takes the newline with it.
        if rest.starts_with("##") {
            let len = rest.find('\n').map_or(rest.len(), |i| i + 1);
            self.advance(len);
            return Ok(Some(self.spanned(Token::Comment, start)));
        }

        if rest.starts_with("#*") {
            let Some(end) = rest[2..].find("*#") else {
                return Err(self.error(
                    Span::new(start, start + 2),
                    "unterminated block comment",
                    Some("`*#`"),
                ));
            };
            self.advance(2 + end + 2);
            return Ok(Some(self.spanned(Token::Comment, start)));
        }

        if let Some((name, len)) = directive_name(rest) {
            if DIRECTIVES.contains(&name) {
                self.advance(len);
                return Ok(Some(self.spanned(Token::Directive(name.to_string()), start)));
            }
        }

        if let Some(braced) = reference_start(rest) {
            self.advance(if braced { 2 } else { 1 });
            return Ok(Some(self.spanned(Token::Reference { braced }, start)));
        }

        // Literal run. The first character is taken unconditionally since it
        // may be a `#` or `$` that did not start anything.
        let first = rest.chars().next().map_or(0, char::len_utf8);
        let len = rest[first..]
            .find(|c: char| c == '#' || c == '$')
            .map_or(rest.len(), |i| i + first);
        self.advance(len);
        Ok(Some(self.spanned(Token::Text(rest[..len].to_string()), start)))
    }

    /// Next token inside an expression, skipping whitespace.
    pub fn next_expr(&mut self) -> Result<Spanned, SyntaxError> {
        let rest = self.remaining().trim_start();
        self.cursor = self.input.len() - rest.len();
        let start = self.cursor;

        let Some(first) = rest.chars().next() else {
            return Ok(self.spanned(Token::Eof, start));
        };

        let two = match rest.get(..2) {
            Some("||") => Some(Token::OrOr),
            Some("&&") => Some(Token::AndAnd),
            Some("==") => Some(Token::EqEq),
            Some("!=") => Some(Token::NotEq),
            Some("<=") => Some(Token::Le),
            Some(">=") => Some(Token::Ge),
            _ => None,
        };
        if let Some(token) = two {
            self.advance(2);
            return Ok(self.spanned(token, start));
        }

        let single = match first {
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '!' => Some(Token::Bang),
            '=' => Some(Token::Assign),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '}' => Some(Token::RBrace),
            ',' => Some(Token::Comma),
            '.' => Some(Token::Dot),
            _ => None,
        };
        if let Some(token) = single {
            self.advance(1);
            return Ok(self.spanned(token, start));
        }

        if first == '$' {
            let braced = rest[1..].starts_with('{');
            self.advance(if braced { 2 } else { 1 });
            return Ok(self.spanned(Token::Reference { braced }, start));
        }

        if first == '"' || first == '\'' {
            let Some(end) = rest[1..].find(first) else {
                return Err(self.error(
                    Span::new(start, self.input.len()),
                    "unterminated string literal",
                    Some(if first == '"' { "`\"`" } else { "`'`" }),
                ));
            };
            self.advance(end + 2);
            let text = rest[1..end + 1].to_string();
            return Ok(self.spanned(Token::StringLit(text), start));
        }

        if first.is_ascii_digit() {
            let len = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            self.advance(len);
            let span = Span::new(start, self.cursor);
            let n = rest[..len]
                .parse::<i64>()
                .map_err(|_| self.error(span, "integer literal out of range", None))?;
            return Ok(self.spanned(Token::Number(n), start));
        }

        if first.is_ascii_alphabetic() {
            let len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            self.advance(len);
            let token = match &rest[..len] {
                "true" => Token::True,
                "false" => Token::False,
                "or" => Token::OrOr,
                "and" => Token::AndAnd,
                "not" => Token::Bang,
                "eq" => Token::EqEq,
                "ne" => Token::NotEq,
                "lt" => Token::Lt,
                "gt" => Token::Gt,
                "le" => Token::Le,
                "ge" => Token::Ge,
                word => Token::Ident(word.to_string()),
            };
            return Ok(self.spanned(token, start));
        }

        Err(self.error(
            Span::new(start, start + first.len_utf8()),
            format!("unexpected character `{first}`"),
            None,
        ))
    }
}

/// `#name` or `#{name}`: the name and the length of the whole marker.
fn directive_name(rest: &str) -> Option<(&str, usize)> {
    let body = rest.strip_prefix('#')?;
    let letters = |s: &str| {
        s.find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(s.len())
    };
    if let Some(inner) = body.strip_prefix('{') {
        let len = letters(inner);
        if len > 0 && inner[len..].starts_with('}') {
            return Some((&inner[..len], len + 3));
        }
        return None;
    }
    let len = letters(body);
    (len > 0).then(|| (&body[..len], len + 1))
}

/// `Some(braced)` when `rest` opens a reference.
fn reference_start(rest: &str) -> Option<bool> {
    let body = rest.strip_prefix('$')?;
    let starts_name = |s: &str| s.starts_with(|c: char| c.is_ascii_alphabetic());
    if starts_name(body) {
        Some(false)
    } else {
        body.strip_prefix('{').filter(|s| starts_name(*s)).map(|_| true)
    }
}
