use indexmap::IndexSet;

use crate::ast::{Expr, ExprKind, QueryAst};

pub struct FreeVariables;

impl FreeVariables {
    /// Free identifiers of `expr`, in first-occurrence order. Lambda parameters and `let` names
    /// are bound inside their bodies; nested queries contribute their correlated references.
    pub fn collect(expr: &Expr) -> IndexSet<String> {
        let mut free = IndexSet::new();
        let mut bound = Vec::new();
        Self::visit(expr, &mut bound, &mut free);
        free
    }

    /// Subset of `aliases` referenced by `expr`, kept in alias order.
    pub fn referenced_aliases<'a, I>(expr: &Expr, aliases: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        Self::referenced_aliases_in(std::slice::from_ref(expr), aliases)
    }

    pub fn referenced_aliases_in<'a, I>(exprs: &[Expr], aliases: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut free = IndexSet::new();
        for expr in exprs {
            free.extend(Self::collect(expr));
        }
        aliases.into_iter().filter(|a| free.contains(*a)).cloned().collect()
    }

    /// Every identifier spelled anywhere in the query: aliases, variables, lambda parameters.
    pub fn query_identifiers(query: &QueryAst) -> IndexSet<String> {
        let mut names = IndexSet::new();
        Self::query_names(query, &mut names);
        names
    }

    fn query_names(query: &QueryAst, names: &mut IndexSet<String>) {
        names.extend(query.aliases().into_iter().map(str::to_string));
        if let Some(key_alias) = query.group.as_ref().and_then(|g| g.key_alias.as_ref()) {
            names.insert(key_alias.clone());
        }
        for expr in Self::query_exprs(query) {
            Self::expr_names(expr, names);
        }
    }

    fn expr_names(expr: &Expr, names: &mut IndexSet<String>) {
        match &expr.kind {
            ExprKind::Var(name) => {
                names.insert(name.clone());
            }
            ExprKind::Lambda(lambda) => names.extend(lambda.params.iter().cloned()),
            ExprKind::Let { bindings, .. } => names.extend(bindings.iter().map(|b| b.name.clone())),
            ExprKind::Query(query) => Self::query_names(query, names),
            _ => {}
        }
        for child in expr.children() {
            Self::expr_names(child, names);
        }
    }

    /// Expressions of a query in clause order.
    pub fn query_exprs(query: &QueryAst) -> Vec<&Expr> {
        let mut exprs = vec![&query.from.source];
        for join in &query.joins {
            exprs.push(&join.source);
            exprs.extend(join.on.iter());
        }
        exprs.extend(query.where_clause.iter().map(|w| &w.predicate));
        if let Some(group) = &query.group {
            exprs.extend(group.classifiers.iter());
            exprs.extend(group.having.iter());
        }
        if let Some(order) = &query.order {
            exprs.extend(order.terms.iter().map(|t| &t.key));
        }
        if let Some(limit) = &query.limit {
            exprs.extend(limit.offset.iter());
            exprs.push(&limit.size);
        }
        if let Some(select) = &query.select {
            exprs.extend(select.projections.iter());
        }
        exprs
    }

    fn visit(expr: &Expr, bound: &mut Vec<String>, free: &mut IndexSet<String>) {
        match &expr.kind {
            ExprKind::Var(name) => {
                if !bound.contains(name) {
                    free.insert(name.clone());
                }
            }
            ExprKind::Lambda(lambda) => {
                let mark = bound.len();
                bound.extend(lambda.params.iter().cloned());
                Self::visit(&lambda.body, bound, free);
                bound.truncate(mark);
            }
            ExprKind::Let { bindings, body } => {
                let mark = bound.len();
                for binding in bindings {
                    Self::visit(&binding.value, bound, free);
                    bound.push(binding.name.clone());
                }
                Self::visit(body, bound, free);
                bound.truncate(mark);
            }
            ExprKind::Query(query) => {
                // `from`/`join` sources are evaluated in the enclosing scope
                Self::visit(&query.from.source, bound, free);
                for join in &query.joins {
                    Self::visit(&join.source, bound, free);
                }
                let mark = bound.len();
                bound.extend(query.aliases().into_iter().map(str::to_string));
                bound.extend(query.group.as_ref().and_then(|g| g.key_alias.clone()));
                for inner in Self::query_exprs(query) {
                    Self::visit(inner, bound, free);
                }
                bound.truncate(mark);
            }
            _ => {
                for child in expr.children() {
                    Self::visit(child, bound, free);
                }
            }
        }
    }
}
