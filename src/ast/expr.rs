use std::fmt;

use ordered_float::NotNan;

use crate::{
    ast::{BinaryOp, Literal, Position, QueryAst, UnaryOp},
    pipeline::QueryThunk,
};

/// Expression node. The front end produces the input kinds; lowering produces a new tree
/// that may additionally contain the output-only kinds (`Let`, `Record`, `PostIncrement`, `Subquery`).
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyName {
    Const(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Box<Expr>,
}

/// Local `name = value` binding introduced ahead of a lambda body.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Var(String),
    Property { object: Box<Expr>, name: PropertyName },
    Index { target: Box<Expr>, index: Box<Expr> },
    /// `receiver: None` is an unqualified call such as `count()`.
    Call { receiver: Option<Box<Expr>>, name: String, args: Vec<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Lambda(Lambda),
    /// Cast-style rename: `expr as alias`.
    Cast { expr: Box<Expr>, alias: String },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Construct { type_name: String, args: Vec<Expr> },
    Query(Box<QueryAst>),

    Let { bindings: Vec<Binding>, body: Box<Expr> },
    Record { values: Vec<Expr>, names: Box<Expr>, aliases: Box<Expr>, row: Option<Box<Expr>> },
    PostIncrement(String),
    /// A lowered nested query, invoked in place.
    Subquery(Box<QueryThunk>),
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self { kind, pos }
    }

    pub fn synthetic(kind: ExprKind) -> Self {
        Self { kind, pos: Position::NONE }
    }

    pub fn at(mut self, line: i32, column: i32) -> Self {
        self.pos = Position::new(line, column);
        self
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::Var(name.into()))
    }

    pub fn int(value: i64) -> Self {
        Self::synthetic(ExprKind::Literal(Literal::Int(value)))
    }

    /// `None` for NaN, which has no literal form.
    pub fn float(value: f64) -> Option<Self> {
        let value = NotNan::new(value).ok()?;
        Some(Self::synthetic(ExprKind::Literal(Literal::Float(value))))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::Literal(Literal::String(value.into())))
    }

    pub fn boolean(value: bool) -> Self {
        Self::synthetic(ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn prop(object: Expr, name: impl Into<String>) -> Self {
        let pos = object.pos;
        Self::new(ExprKind::Property { object: Box::new(object), name: PropertyName::Const(name.into()) }, pos)
    }

    pub fn computed_prop(object: Expr, name: Expr) -> Self {
        let pos = object.pos;
        Self::new(ExprKind::Property { object: Box::new(object), name: PropertyName::Computed(Box::new(name)) }, pos)
    }

    /// `alias.field`, the most common shape in query text.
    pub fn field(alias: &str, field: &str) -> Self {
        Self::prop(Self::var(alias), field)
    }

    pub fn index(target: Expr, index: Expr) -> Self {
        let pos = target.pos;
        Self::new(ExprKind::Index { target: Box::new(target), index: Box::new(index) }, pos)
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::synthetic(ExprKind::Call { receiver: None, name: name.into(), args })
    }

    pub fn method(receiver: Expr, name: impl Into<String>, args: Vec<Expr>) -> Self {
        let pos = receiver.pos;
        Self::new(ExprKind::Call { receiver: Some(Box::new(receiver)), name: name.into(), args }, pos)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let pos = left.pos;
        Self::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, pos)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let pos = operand.pos;
        Self::new(ExprKind::Unary { op, operand: Box::new(operand) }, pos)
    }

    pub fn lambda(params: Vec<String>, body: Expr) -> Self {
        let pos = body.pos;
        Self::new(ExprKind::Lambda(Lambda { params, body: Box::new(body) }), pos)
    }

    pub fn cast(expr: Expr, alias: impl Into<String>) -> Self {
        let pos = expr.pos;
        Self::new(ExprKind::Cast { expr: Box::new(expr), alias: alias.into() }, pos)
    }

    pub fn list(items: Vec<Expr>) -> Self {
        Self::synthetic(ExprKind::List(items))
    }

    pub fn query(query: QueryAst) -> Self {
        let pos = query.pos;
        Self::new(ExprKind::Query(Box::new(query)), pos)
    }

    pub fn as_var(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Direct sub-expressions; nested queries and lowered subqueries are opaque here.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Var(_) | ExprKind::PostIncrement(_)
            | ExprKind::Query(_) | ExprKind::Subquery(_) => vec![],
            ExprKind::Property { object, name } => match name {
                PropertyName::Const(_) => vec![object.as_ref()],
                PropertyName::Computed(name) => vec![object.as_ref(), name.as_ref()],
            },
            ExprKind::Index { target, index } => vec![target.as_ref(), index.as_ref()],
            ExprKind::Call { receiver, args, .. } => receiver.iter().map(|r| r.as_ref()).chain(args.iter()).collect(),
            ExprKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            ExprKind::Unary { operand, .. } => vec![operand.as_ref()],
            ExprKind::Lambda(lambda) => vec![lambda.body.as_ref()],
            ExprKind::Cast { expr, .. } => vec![expr.as_ref()],
            ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Construct { args: items, .. } => items.iter().collect(),
            ExprKind::Let { bindings, body } => bindings.iter().map(|b| &b.value).chain(std::iter::once(body.as_ref())).collect(),
            ExprKind::Record { values, names, aliases, row } => values.iter()
                .chain([names.as_ref(), aliases.as_ref()])
                .chain(row.iter().map(|r| r.as_ref()))
                .collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Literal(_) | ExprKind::Var(_) | ExprKind::PostIncrement(_)
            | ExprKind::Query(_) | ExprKind::Subquery(_) => vec![],
            ExprKind::Property { object, name } => match name {
                PropertyName::Const(_) => vec![object.as_mut()],
                PropertyName::Computed(name) => vec![object.as_mut(), name.as_mut()],
            },
            ExprKind::Index { target, index } => vec![target.as_mut(), index.as_mut()],
            ExprKind::Call { receiver, args, .. } => receiver.iter_mut().map(|r| r.as_mut()).chain(args.iter_mut()).collect(),
            ExprKind::Binary { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            ExprKind::Unary { operand, .. } => vec![operand.as_mut()],
            ExprKind::Lambda(lambda) => vec![lambda.body.as_mut()],
            ExprKind::Cast { expr, .. } => vec![expr.as_mut()],
            ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Construct { args: items, .. } => items.iter_mut().collect(),
            ExprKind::Let { bindings, body } => bindings.iter_mut().map(|b| &mut b.value).chain(std::iter::once(body.as_mut())).collect(),
            ExprKind::Record { values, names, aliases, row } => values.iter_mut()
                .chain([names.as_mut(), aliases.as_mut()])
                .chain(row.iter_mut().map(|r| r.as_mut()))
                .collect(),
        }
    }

    /// Precedence used when rendering; atoms bind tightest.
    fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::Lambda(_) | ExprKind::Cast { .. } => 0,
            ExprKind::Unary { .. } => 7,
            _ => u8::MAX,
        }
    }
}

impl Lambda {
    pub fn new(params: Vec<String>, body: Expr) -> Self {
        Self { params, body: Box::new(body) }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Expr, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({})", operand)
    } else {
        write!(f, "{}", operand)
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params.as_slice() {
            [single] => write!(f, "{} -> {}", single, self.body),
            params => write!(f, "({}) -> {}", params.join(", "), self.body),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(l) => write!(f, "{}", l),
            ExprKind::Var(name) => write!(f, "{}", name),
            ExprKind::Property { object, name } => {
                write_operand(f, object, object.precedence() != u8::MAX)?;
                match name {
                    PropertyName::Const(n) => write!(f, ".{}", n),
                    PropertyName::Computed(e) => write!(f, ".({})", e),
                }
            }
            ExprKind::Index { target, index } => {
                write_operand(f, target, target.precedence() != u8::MAX)?;
                write!(f, "[{}]", index)
            }
            ExprKind::Call { receiver, name, args } => {
                if let Some(receiver) = receiver {
                    write_operand(f, receiver, receiver.precedence() != u8::MAX)?;
                    write!(f, ".")?;
                }
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Binary { op, left, right } => {
                write_operand(f, left, left.precedence() < op.precedence())?;
                write!(f, " {} ", op)?;
                write_operand(f, right, right.precedence() <= op.precedence())
            }
            ExprKind::Unary { op, operand } => {
                // `-(-x)`, never `--x`
                let signed = match &operand.kind {
                    ExprKind::Literal(Literal::Int(n)) => *n < 0,
                    ExprKind::Literal(Literal::Float(n)) => n.is_sign_negative(),
                    _ => false,
                };
                write!(f, "{}", op)?;
                write_operand(f, operand, signed || operand.precedence() <= self.precedence())
            }
            ExprKind::Lambda(lambda) => write!(f, "{}", lambda),
            ExprKind::Cast { expr, alias } => {
                write_operand(f, expr, expr.precedence() == 0)?;
                write!(f, " as {}", alias)
            }
            ExprKind::List(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            ExprKind::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            ExprKind::Construct { type_name, args } => {
                write!(f, "new {}(", type_name)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Query(query) => write!(f, "({})", query),
            ExprKind::Let { bindings, body } => {
                write!(f, "{{ ")?;
                for binding in bindings {
                    write!(f, "{} = {}; ", binding.name, binding.value)?;
                }
                write!(f, "{} }}", body)
            }
            ExprKind::Record { values, names, aliases, row } => {
                write!(f, "NamedRecord([")?;
                write_list(f, values)?;
                write!(f, "], names={}, aliases={}", names, aliases)?;
                if let Some(row) = row {
                    write!(f, ", row={}", row)?;
                }
                write!(f, ")")
            }
            ExprKind::PostIncrement(counter) => write!(f, "{}++", counter),
            ExprKind::Subquery(thunk) => write!(f, "({})()", thunk),
        }
    }
}
