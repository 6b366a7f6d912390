// from n in nums                                   V
// innerjoin m in ms on n.id == m.id                V (repeatable)
// where n.v > 1                                    V
// groupby n.k into g having count() > 1            V
// orderby n.v in desc                              V
// limit 0, 10                                      V
// select n.k, count()                              V (required)

use std::fmt;

use crate::ast::{Expr, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    /// Name of the queryable call this join lowers to.
    pub fn call_name(&self) -> &'static str {
        match self {
            JoinKind::Inner => "innerJoin",
            JoinKind::Left => "leftJoin",
            JoinKind::Right => "rightJoin",
            JoinKind::Full => "fullJoin",
            JoinKind::Cross => "crossJoin",
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "innerjoin",
            JoinKind::Left => "leftjoin",
            JoinKind::Right => "rightjoin",
            JoinKind::Full => "fulljoin",
            JoinKind::Cross => "crossjoin",
        }
    }

    pub fn requires_predicate(&self) -> bool {
        !matches!(self, JoinKind::Cross)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub alias: String,
    pub source: Expr,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub alias: String,
    pub source: Expr,
    pub on: Option<Expr>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub predicate: Expr,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupClause {
    pub classifiers: Vec<Expr>,
    /// Name bound to the whole group key (`groupby ... into g`).
    pub key_alias: Option<String>,
    pub having: Option<Expr>,
    pub pos: Position,
}

/// Raw direction token as written after `in`; validated during lowering.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionToken {
    pub text: String,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub key: Expr,
    pub direction: Option<DirectionToken>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderClause {
    pub terms: Vec<OrderTerm>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitClause {
    pub offset: Option<Expr>,
    pub size: Expr,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    pub projections: Vec<Expr>,
    pub pos: Position,
}

/// Parsed query, one slot per clause kind in the fixed clause order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAst {
    pub from: FromClause,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<WhereClause>,
    pub group: Option<GroupClause>,
    pub order: Option<OrderClause>,
    pub limit: Option<LimitClause>,
    pub select: Option<SelectClause>,
    pub pos: Position,
}

impl QueryAst {
    pub fn from(alias: impl Into<String>, source: Expr) -> Self {
        let pos = source.pos;
        Self {
            from: FromClause { alias: alias.into(), source, pos },
            joins: vec![],
            where_clause: None,
            group: None,
            order: None,
            limit: None,
            select: None,
            pos,
        }
    }

    pub fn at(mut self, line: i32, column: i32) -> Self {
        self.pos = Position::new(line, column);
        self.from.pos = self.pos;
        self
    }

    pub fn join(mut self, kind: JoinKind, alias: impl Into<String>, source: Expr, on: Option<Expr>) -> Self {
        let pos = source.pos;
        self.joins.push(JoinClause { kind, alias: alias.into(), source, on, pos });
        self
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        let pos = predicate.pos;
        self.where_clause = Some(WhereClause { predicate, pos });
        self
    }

    pub fn group_by(mut self, classifiers: Vec<Expr>, key_alias: Option<&str>, having: Option<Expr>) -> Self {
        let pos = classifiers.first().map(|c| c.pos).unwrap_or_default();
        self.group = Some(GroupClause {
            classifiers,
            key_alias: key_alias.map(str::to_string),
            having,
            pos,
        });
        self
    }

    pub fn order_by(mut self, terms: Vec<OrderTerm>) -> Self {
        let pos = terms.first().map(|t| t.key.pos).unwrap_or_default();
        self.order = Some(OrderClause { terms, pos });
        self
    }

    pub fn limit(mut self, offset: Option<Expr>, size: Expr) -> Self {
        let pos = size.pos;
        self.limit = Some(LimitClause { offset, size, pos });
        self
    }

    pub fn select(mut self, projections: Vec<Expr>) -> Self {
        let pos = projections.first().map(|p| p.pos).unwrap_or_default();
        self.select = Some(SelectClause { projections, pos });
        self
    }

    /// Every alias declared by this query, in declaration order.
    pub fn aliases(&self) -> Vec<&str> {
        std::iter::once(self.from.alias.as_str())
            .chain(self.joins.iter().map(|j| j.alias.as_str()))
            .collect()
    }
}

impl OrderTerm {
    pub fn asc(key: Expr) -> Self {
        Self { key, direction: None }
    }

    pub fn with_direction(key: Expr, text: &str, pos: Position) -> Self {
        Self { key, direction: Some(DirectionToken { text: text.to_string(), pos }) }
    }
}

fn join_exprs(items: &[Expr]) -> String {
    items.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for QueryAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {} in {}", self.from.alias, self.from.source)?;
        for join in &self.joins {
            write!(f, " {} {} in {}", join.kind.keyword(), join.alias, join.source)?;
            if let Some(on) = &join.on {
                write!(f, " on {}", on)?;
            }
        }
        if let Some(w) = &self.where_clause {
            write!(f, " where {}", w.predicate)?;
        }
        if let Some(g) = &self.group {
            write!(f, " groupby {}", join_exprs(&g.classifiers))?;
            if let Some(key_alias) = &g.key_alias {
                write!(f, " into {}", key_alias)?;
            }
            if let Some(having) = &g.having {
                write!(f, " having {}", having)?;
            }
        }
        if let Some(o) = &self.order {
            let terms = o.terms.iter()
                .map(|t| match &t.direction {
                    Some(d) => format!("{} in {}", t.key, d.text),
                    None => t.key.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " orderby {}", terms)?;
        }
        if let Some(l) = &self.limit {
            match &l.offset {
                Some(offset) => write!(f, " limit {}, {}", offset, l.size)?,
                None => write!(f, " limit {}", l.size)?,
            }
        }
        if let Some(s) = &self.select {
            write!(f, " select {}", join_exprs(&s.projections))?;
        }
        Ok(())
    }
}
