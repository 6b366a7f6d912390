use crate::{
    ast::{Binding, Expr, ExprKind, Lambda, PropertyName, QueryAst},
    lowering::{
        AggregateResolver, AliasPathResolver, DataSource, FreeVariables, GroupResolver, LoweringContext,
        LoweringError, NameGenerator,
    },
    pipeline::{PipelineBuilder, PipelineSlot},
};

/// Result of resolving one or more expressions against a data source: the lambda parameter
/// bound to the incoming row, the alias bindings the expressions need, and the rewritten bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeResolution {
    pub param: String,
    pub bindings: Vec<Binding>,
    pub exprs: Vec<Expr>,
}

impl ScopeResolution {
    pub fn expr(&self) -> &Expr {
        &self.exprs[0]
    }

    /// `param -> body` for the single resolved expression.
    pub fn into_lambda(mut self, inline: bool) -> Lambda {
        let body = self.exprs.swap_remove(0);
        let body = ScopeResolver::bind(&self.bindings, body, inline);
        Lambda::new(vec![self.param], body)
    }

    /// `param -> body` for a body assembled by the caller from the resolved expressions.
    pub fn close_over(self, body: Expr, inline: bool) -> Lambda {
        let body = ScopeResolver::bind(&self.bindings, body, inline);
        Lambda::new(vec![self.param], body)
    }
}

/// Parameter and enclosing source of the expression being rewritten.
/// `source: None` marks a value position (a `from` source or a `limit` bound) outside any row.
struct RewriteScope<'s> {
    source: Option<&'s DataSource>,
    param: &'s str,
}

pub struct ScopeResolver;

impl ScopeResolver {
    pub fn resolve(source: &DataSource, expr: &Expr, ctx: &mut LoweringContext) -> Result<ScopeResolution, LoweringError> {
        Self::resolve_all(source, std::slice::from_ref(expr), ctx)
    }

    /// Resolves several expressions that share one row parameter, e.g. the projections of a `select`.
    /// The parameter name is memoized on the first expression.
    pub fn resolve_all(source: &DataSource, exprs: &[Expr], ctx: &mut LoweringContext) -> Result<ScopeResolution, LoweringError> {
        let anchor = exprs
            .first()
            .ok_or_else(|| LoweringError::UnexpectedNode("empty expression list".to_string()))?;
        let param = Self::parameter_name(source, anchor, ctx);
        let bindings = Self::bindings(source, &param, exprs)?;

        let scope = RewriteScope { source: Some(source), param: &param };
        let mut bound = Vec::new();
        let mut rewritten = Vec::with_capacity(exprs.len());
        for expr in exprs {
            rewritten.push(Self::rewrite(expr, &scope, &mut bound, ctx)?);
        }

        tracing::trace!(param = %param, bindings = bindings.len(), "resolved scope");
        Ok(ScopeResolution { param, bindings, exprs: rewritten })
    }

    /// Rewrites an expression that is evaluated once, outside of any row: nested queries are lowered,
    /// everything else passes through.
    pub fn resolve_value(expr: &Expr, ctx: &mut LoweringContext) -> Result<Expr, LoweringError> {
        let scope = RewriteScope { source: None, param: "" };
        Self::rewrite(expr, &scope, &mut Vec::new(), ctx)
    }

    /// A plain table reuses its declared alias; joined and grouped rows get a synthetic name.
    pub fn parameter_name(source: &DataSource, anchor: &Expr, ctx: &mut LoweringContext) -> String {
        match source {
            DataSource::Table { alias } => alias.clone(),
            _ => ctx.names.name_for(anchor),
        }
    }

    /// One binding per alias free in `exprs`, in join order.
    pub fn bindings(source: &DataSource, param: &str, exprs: &[Expr]) -> Result<Vec<Binding>, LoweringError> {
        let paths = AliasPathResolver::build_paths(source);
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        FreeVariables::referenced_aliases_in(exprs, paths.keys())
            .into_iter()
            .map(|alias| {
                let path = paths.get(&alias).ok_or_else(|| LoweringError::UnresolvedAlias(alias.clone()))?;
                Ok(Binding { value: path.apply(Expr::var(param)), name: alias })
            })
            .collect()
    }

    /// Attaches bindings to a body, either as a leading `let` block or by substituting each alias
    /// with its access path.
    pub fn bind(bindings: &[Binding], body: Expr, inline: bool) -> Expr {
        if bindings.is_empty() {
            return body;
        }
        if inline {
            let mut body = body;
            Self::substitute(&mut body, bindings, &mut Vec::new());
            return body;
        }
        let pos = body.pos;
        Expr::new(ExprKind::Let { bindings: bindings.to_vec(), body: Box::new(body) }, pos)
    }

    fn substitute(expr: &mut Expr, bindings: &[Binding], bound: &mut Vec<String>) {
        if let ExprKind::Var(name) = &expr.kind {
            let binding = if bound.contains(name) { None } else { bindings.iter().find(|b| b.name == *name) };
            if let Some(binding) = binding {
                *expr = Expr { pos: expr.pos, ..binding.value.clone() };
            }
            return;
        }

        let mark = bound.len();
        let scoped = match &mut expr.kind {
            ExprKind::Lambda(lambda) => {
                bound.extend(lambda.params.iter().cloned());
                Self::substitute(&mut lambda.body, bindings, bound);
                true
            }
            ExprKind::Let { bindings: locals, body } => {
                for local in locals.iter_mut() {
                    Self::substitute(&mut local.value, bindings, bound);
                    bound.push(local.name.clone());
                }
                Self::substitute(body, bindings, bound);
                true
            }
            ExprKind::Subquery(thunk) => {
                for slot in thunk.pipeline.slots_mut() {
                    match slot {
                        PipelineSlot::Value(value) => Self::substitute(value, bindings, bound),
                        PipelineSlot::Lambda(lambda) => {
                            let inner = bound.len();
                            bound.extend(lambda.params.iter().cloned());
                            Self::substitute(&mut lambda.body, bindings, bound);
                            bound.truncate(inner);
                        }
                    }
                }
                true
            }
            _ => false,
        };
        if !scoped {
            for child in expr.children_mut() {
                Self::substitute(child, bindings, bound);
            }
        }
        bound.truncate(mark);
    }

    /// Rewrites `expr` under the current group scope, for aggregate arguments handed the whole group.
    pub(crate) fn rewrite_in_group(
        expr: &Expr,
        source: &DataSource,
        param: &str,
        bound: &mut Vec<String>,
        ctx: &mut LoweringContext,
    ) -> Result<Expr, LoweringError> {
        let scope = RewriteScope { source: Some(source), param };
        Self::rewrite(expr, &scope, bound, ctx)
    }

    fn rewrite(expr: &Expr, scope: &RewriteScope, bound: &mut Vec<String>, ctx: &mut LoweringContext) -> Result<Expr, LoweringError> {
        let grouped = scope.source.filter(|s| s.is_grouped());
        if let (Some(source), Some((entry, args))) = (grouped, AggregateResolver::as_aggregate_call(expr)) {
            return GroupResolver::rewrite_aggregate(expr, entry, args, source, scope.param, bound, ctx);
        }

        let kind = match &expr.kind {
            ExprKind::Var(name) => return Self::rewrite_var(expr, name, scope, bound.as_slice(), ctx),

            ExprKind::Query(query) => return Self::rewrite_subquery(expr, query, false, scope, bound.as_slice(), ctx),

            // `x in (query)` tests membership against the materialized sub-query
            ExprKind::Binary { op, left, right } if op.is_membership() => match &right.kind {
                ExprKind::Query(query) => {
                    let left = Self::rewrite(left, scope, bound, ctx)?;
                    let right = Self::rewrite_subquery(right, query, true, scope, bound.as_slice(), ctx)?;
                    ExprKind::Binary { op: *op, left: Box::new(left), right: Box::new(right) }
                }
                _ => ExprKind::Binary {
                    op: *op,
                    left: Box::new(Self::rewrite(left, scope, bound, ctx)?),
                    right: Box::new(Self::rewrite(right, scope, bound, ctx)?),
                },
            },

            ExprKind::Literal(literal) => ExprKind::Literal(literal.clone()),
            ExprKind::Property { object, name } => {
                let object = Box::new(Self::rewrite(object, scope, bound, ctx)?);
                let name = match name {
                    PropertyName::Const(n) => PropertyName::Const(n.clone()),
                    PropertyName::Computed(e) => PropertyName::Computed(Box::new(Self::rewrite(e, scope, bound, ctx)?)),
                };
                ExprKind::Property { object, name }
            }
            ExprKind::Index { target, index } => ExprKind::Index {
                target: Box::new(Self::rewrite(target, scope, bound, ctx)?),
                index: Box::new(Self::rewrite(index, scope, bound, ctx)?),
            },
            ExprKind::Call { receiver, name, args } => {
                let receiver = match receiver {
                    Some(r) => Some(Box::new(Self::rewrite(r, scope, bound, ctx)?)),
                    None => None,
                };
                ExprKind::Call { receiver, name: name.clone(), args: Self::rewrite_all(args, scope, bound, ctx)? }
            }
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op: *op,
                left: Box::new(Self::rewrite(left, scope, bound, ctx)?),
                right: Box::new(Self::rewrite(right, scope, bound, ctx)?),
            },
            ExprKind::Unary { op, operand } => {
                ExprKind::Unary { op: *op, operand: Box::new(Self::rewrite(operand, scope, bound, ctx)?) }
            }
            ExprKind::Lambda(lambda) => {
                let mark = bound.len();
                bound.extend(lambda.params.iter().cloned());
                let body = Self::rewrite(&lambda.body, scope, bound, ctx);
                bound.truncate(mark);
                ExprKind::Lambda(Lambda::new(lambda.params.clone(), body?))
            }
            ExprKind::Cast { expr: inner, alias } => {
                ExprKind::Cast { expr: Box::new(Self::rewrite(inner, scope, bound, ctx)?), alias: alias.clone() }
            }
            ExprKind::List(items) => ExprKind::List(Self::rewrite_all(items, scope, bound, ctx)?),
            ExprKind::Tuple(items) => ExprKind::Tuple(Self::rewrite_all(items, scope, bound, ctx)?),
            ExprKind::Construct { type_name, args } => {
                ExprKind::Construct { type_name: type_name.clone(), args: Self::rewrite_all(args, scope, bound, ctx)? }
            }

            ExprKind::Let { .. } | ExprKind::Record { .. } | ExprKind::PostIncrement(_) | ExprKind::Subquery(_) => {
                return Err(LoweringError::UnexpectedNode(expr.to_string()));
            }
        };
        Ok(Expr::new(kind, expr.pos))
    }

    /// Lowers a nested query in place. Under a group scope the outer names it still refers to
    /// are bound ahead of it, since the `(key, group)` parameter is all the row carries.
    fn rewrite_subquery(
        expr: &Expr,
        query: &QueryAst,
        materialize: bool,
        scope: &RewriteScope,
        bound: &[String],
        ctx: &mut LoweringContext,
    ) -> Result<Expr, LoweringError> {
        let thunk = PipelineBuilder::lower_nested(query, ctx)?;
        let mut lowered = Expr::new(ExprKind::Subquery(Box::new(thunk)), expr.pos);
        if materialize {
            lowered = Expr::method(lowered, "toList", vec![]);
        }

        let bindings = Self::group_bindings(expr, scope, bound, ctx);
        if bindings.is_empty() {
            return Ok(lowered);
        }
        // the sub-query declares its own metadata table, so `_g` cannot be substituted into it
        let metadata = ctx.config.metadata_binding.as_str();
        let (deferred, inlined): (Vec<_>, Vec<_>) =
            bindings.into_iter().partition(|b| FreeVariables::collect(&b.value).contains(metadata));
        let lowered = Self::bind(&inlined, lowered, ctx.config.inline_bindings);
        Ok(Self::bind(&deferred, lowered, false))
    }

    /// Group-scope names free in `expr`, each bound to what it reads from the group parameter.
    fn group_bindings(expr: &Expr, scope: &RewriteScope, bound: &[String], ctx: &LoweringContext) -> Vec<Binding> {
        let Some(source) = scope.source else {
            return Vec::new();
        };
        let Some(group) = source.group() else {
            return Vec::new();
        };
        let aliases = source.aliases();
        FreeVariables::collect(expr)
            .into_iter()
            .filter(|name| !bound.contains(name))
            .filter(|name| !NameGenerator::is_type_identifier(name) || aliases.contains(name))
            .filter_map(|name| {
                let value = GroupResolver::rewrite_var(&name, group, scope.param, ctx)?;
                Some(Binding { name, value })
            })
            .collect()
    }

    fn rewrite_all(exprs: &[Expr], scope: &RewriteScope, bound: &mut Vec<String>, ctx: &mut LoweringContext) -> Result<Vec<Expr>, LoweringError> {
        exprs.iter().map(|e| Self::rewrite(e, scope, bound, ctx)).collect()
    }

    fn rewrite_var(expr: &Expr, name: &str, scope: &RewriteScope, bound: &[String], ctx: &mut LoweringContext) -> Result<Expr, LoweringError> {
        if bound.iter().any(|b| b == name) || name == ctx.config.metadata_binding {
            return Ok(expr.clone());
        }

        if name == ctx.config.row_number_identifier && ctx.frame()?.select_mode {
            ctx.frame_mut()?.row_number_used = true;
            let counter = ctx.config.row_counter.clone();
            return Ok(Expr::new(ExprKind::PostIncrement(counter), expr.pos));
        }

        let Some(source) = scope.source else {
            return Ok(expr.clone());
        };
        let declared = source.aliases().iter().any(|a| a == name);
        if NameGenerator::is_type_identifier(name) && !declared {
            return Ok(expr.clone());
        }

        if let Some(group) = source.group() {
            if let Some(rewritten) = GroupResolver::rewrite_var(name, group, scope.param, ctx) {
                return Ok(Expr { pos: expr.pos, ..rewritten });
            }
        }
        Ok(expr.clone())
    }
}
