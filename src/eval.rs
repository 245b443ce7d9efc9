use crate::ast::*;
use crate::error::{EvaluationError, EvaluationErrorKind, TemplateSource};
use crate::object;
use crate::value::Value;
use std::collections::HashMap;

/// Variables visible to a template. `#set` writes back into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    vars: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Context::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Bind `name`, returning what it was bound to before.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.keys().cloned().collect();
        names.sort();
        names
    }
}

impl From<HashMap<String, Value>> for Context {
    fn from(vars: HashMap<String, Value>) -> Self {
        Self { vars }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// `==` as templates see it: integers by value, null only equal to null,
/// everything else by rendered text. So `"1" == 1` holds, and so does a host
/// object compared with a string it renders as.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => a.to_string() == b.to_string(),
    }
}

pub struct Evaluator<'a> {
    source: &'a TemplateSource,
    ctx: &'a mut Context,
}

impl<'a> Evaluator<'a> {
    pub fn new(source: &'a TemplateSource, ctx: &'a mut Context) -> Self {
        Self { source, ctx }
    }

    fn error(&self, span: Span, kind: EvaluationErrorKind) -> EvaluationError {
        EvaluationError::new(self.source, span, kind)
    }

    pub fn render(&mut self, nodes: &[Node]) -> Result<String, EvaluationError> {
        let mut output = String::new();
        for node in nodes {
            match node {
                Node::Text(s) => output.push_str(s),
                Node::Reference(reference) => {
                    let value = self.resolve(reference)?;
                    if value.is_null() {
                        let text = self.source.slice(reference.span).to_string();
                        return Err(self.error(
                            reference.span,
                            EvaluationErrorKind::NullValue { reference: text },
                        ));
                    }
                    output.push_str(&value.to_string());
                }
                Node::Directive(Directive::Set { target, value, span }) => {
                    let value = self.eval(value)?;
                    tracing::trace!(
                        name = %target,
                        value = %value,
                        offset = span.start,
                        "set"
                    );
                    self.ctx.set(target.as_str(), value);
                }
            }
        }
        Ok(output)
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvaluationError> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Int(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Reference(reference) => self.resolve(reference),
            ExprKind::Unary(UnaryOp::Not, operand) => {
                Ok(Value::Bool(!self.eval(operand)?.is_truthy()))
            }
            ExprKind::Unary(UnaryOp::Neg, operand) => {
                let n = self.int_operand("-", operand)?;
                Ok(Value::Int(n.wrapping_neg()))
            }
            ExprKind::Binary(op, lhs, rhs) => self.eval_binary(*op, lhs, rhs, expr.span),
        }
    }

    fn eval_binary(&self, op: BinOp, lhs: &Expr, rhs: &Expr, span: Span) -> Result<Value, EvaluationError> {
        // Logical operators short-circuit and always yield a boolean.
        match op {
            BinOp::And => {
                let result = self.eval(lhs)?.is_truthy() && self.eval(rhs)?.is_truthy();
                return Ok(Value::Bool(result));
            }
            BinOp::Or => {
                let result = self.eval(lhs)?.is_truthy() || self.eval(rhs)?.is_truthy();
                return Ok(Value::Bool(result));
            }
            BinOp::Eq => {
                let equal = loose_equals(&self.eval(lhs)?, &self.eval(rhs)?);
                return Ok(Value::Bool(equal));
            }
            BinOp::Ne => {
                let equal = loose_equals(&self.eval(lhs)?, &self.eval(rhs)?);
                return Ok(Value::Bool(!equal));
            }
            _ => {}
        }

        let symbol = op.symbol();
        match op {
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                let (a, b) = (self.int_operand(symbol, lhs)?, self.int_operand(symbol, rhs)?);
                let result = match op {
                    BinOp::Lt => a < b,
                    BinOp::Gt => a > b,
                    BinOp::Le => a <= b,
                    _ => a >= b,
                };
                Ok(Value::Bool(result))
            }
            BinOp::Div | BinOp::Rem => {
                let (a, b) = (self.int_operand(symbol, lhs)?, self.int_operand(symbol, rhs)?);
                if b == 0 {
                    return Err(self.error(span, EvaluationErrorKind::DivisionByZero { op: symbol }));
                }
                let result = if op == BinOp::Div {
                    a.wrapping_div(b)
                } else {
                    a.wrapping_rem(b)
                };
                Ok(Value::Int(result))
            }
            _ => {
                let (a, b) = (self.int_operand(symbol, lhs)?, self.int_operand(symbol, rhs)?);
                let result = match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                };
                Ok(Value::Int(result))
            }
        }
    }

    fn int_operand(&self, op: &'static str, expr: &Expr) -> Result<i32, EvaluationError> {
        match self.eval(expr)? {
            Value::Int(n) => Ok(n),
            other => Err(self.error(
                expr.span,
                EvaluationErrorKind::TypeMismatch {
                    op,
                    expected: "int",
                    found: other.type_name().to_string(),
                },
            )),
        }
    }

    /// Look up the base variable and apply each step in turn.
    fn resolve(&self, reference: &Reference) -> Result<Value, EvaluationError> {
        let Some(mut value) = self.ctx.get(&reference.name).cloned() else {
            return Err(self.error(
                reference.span,
                EvaluationErrorKind::Undefined {
                    name: reference.name.clone(),
                    available: self.ctx.names(),
                },
            ));
        };

        for step in &reference.steps {
            if value.is_null() {
                let prefix = Span::new(reference.span.start, step.span.start);
                let text = self.source.slice(prefix).replacen("${", "$", 1);
                return Err(self.error(prefix, EvaluationErrorKind::NullValue { reference: text }));
            }
            let next = match &step.kind {
                StepKind::Property(name) => object::property(&value, name),
                StepKind::Method(name, args) => {
                    let args = args
                        .iter()
                        .map(|arg| self.eval(arg))
                        .collect::<Result<Vec<_>, _>>()?;
                    object::invoke(&value, name, &args)
                }
                StepKind::Index(key) => {
                    let key = self.eval(key)?;
                    object::index(&value, key)
                }
            };
            value = next.map_err(|kind| self.error(step.span, kind))?;
        }
        Ok(value)
    }
}
