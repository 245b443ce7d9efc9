use miette::SourceSpan;
use std::fmt;

/// Byte range into the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        (span.start, span.end.saturating_sub(span.start)).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Levels in this tree, counting the node itself. Evaluation recurses
    /// this deep.
    pub height: usize,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        let below = match &kind {
            ExprKind::Number(_) | ExprKind::String(_) | ExprKind::Bool(_) => 0,
            ExprKind::Reference(reference) => reference.height(),
            ExprKind::Unary(_, operand) => operand.height,
            ExprKind::Binary(_, lhs, rhs) => lhs.height.max(rhs.height),
        };
        Self {
            kind,
            span,
            height: below + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(i32),
    String(String),
    Bool(bool),
    Reference(Reference),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// `$name` followed by accessor steps, applied left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub steps: Vec<Step>,
    /// Whole reference including `$`, and braces if present.
    pub span: Span,
}

impl Reference {
    /// Tallest expression among the method arguments and index keys.
    pub fn height(&self) -> usize {
        self.steps
            .iter()
            .flat_map(|step| -> &[Expr] {
                match &step.kind {
                    StepKind::Property(_) => &[],
                    StepKind::Method(_, args) => args,
                    StepKind::Index(key) => std::slice::from_ref(key.as_ref()),
                }
            })
            .map(|e| e.height)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub kind: StepKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Property(String),         // $x.name
    Method(String, Vec<Expr>), // $x.name(args)
    Index(Box<Expr>),          // $x[expr]
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `#set ($target = value)`
    Set {
        target: String,
        value: Expr,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Reference(Reference),
    Directive(Directive),
}
