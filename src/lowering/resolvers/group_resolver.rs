use crate::{
    ast::{Expr, ExprKind},
    lowering::{
        AggregateEntry, AggregateResolver, AggregateRule, DataSource, GroupScope, LoweringContext, LoweringError,
        MetadataKey, ScopeResolver, SyntaxError,
    },
};

/// Rewrites for clauses downstream of `groupby`, where the row is `(key, groupedQueryable)`.
pub struct GroupResolver;

impl GroupResolver {
    pub fn key(param: &str) -> Expr {
        Expr::prop(Expr::var(param), "first")
    }

    pub fn grouped(param: &str) -> Expr {
        Expr::prop(Expr::var(param), "second")
    }

    /// Group fields become `key.<field>`, table aliases (and the `into` alias) become `key`,
    /// and the current-group identifier navigates the grouped queryable by alias name.
    pub fn rewrite_var(name: &str, group: &GroupScope, param: &str, ctx: &LoweringContext) -> Option<Expr> {
        if name == ctx.config.group_identifier {
            let aliases = MetadataKey::AliasNameList.lookup(&ctx.config.metadata_binding);
            return Some(Expr::method(Self::grouped(param), "withAliases", vec![aliases]));
        }
        if group.is_group_name(name) {
            return Some(Expr::prop(Self::key(param), name));
        }
        if group.is_table_alias(name) {
            return Some(Self::key(param));
        }
        None
    }

    pub fn rewrite_aggregate(
        expr: &Expr,
        entry: &AggregateEntry,
        args: &[Expr],
        source: &DataSource,
        param: &str,
        bound: &mut Vec<String>,
        ctx: &mut LoweringContext,
    ) -> Result<Expr, LoweringError> {
        let group = source.group().ok_or_else(|| LoweringError::UnexpectedNode(expr.to_string()))?;
        let name = entry.kind.name();

        let args = match entry.rule_for(args.len()) {
            Some(AggregateRule::CountAll) => Vec::new(),
            Some(AggregateRule::PerRowSelector) => {
                let arg = &args[0];
                let whole_group = AggregateResolver::root_alias(arg) == Some(ctx.config.group_identifier.as_str());
                if whole_group {
                    ctx.report(SyntaxError::new(
                        format!("{}() takes a per-row selector; use agg() to reduce the whole group", name),
                        arg.pos,
                    ));
                }
                let selector = ScopeResolver::resolve(&group.prior, arg, ctx)?.into_lambda(ctx.config.inline_bindings);
                vec![Expr::new(ExprKind::Lambda(selector), arg.pos)]
            }
            Some(AggregateRule::WholeGroup) => {
                vec![ScopeResolver::rewrite_in_group(&args[0], source, param, bound, ctx)?]
            }
            None => {
                ctx.report(SyntaxError::new(
                    format!("{}() takes {} argument(s), got {}", name, entry.accepted_counts(), args.len()),
                    expr.pos,
                ));
                let mut rewritten = Vec::with_capacity(args.len());
                for arg in args {
                    rewritten.push(ScopeResolver::rewrite_in_group(arg, source, param, bound, ctx)?);
                }
                let call = ExprKind::Call { receiver: None, name: name.to_string(), args: rewritten };
                return Ok(Expr::new(call, expr.pos));
            }
        };

        tracing::trace!(aggregate = name, args = args.len(), "rewrote aggregate");
        let call = ExprKind::Call { receiver: Some(Box::new(Self::grouped(param))), name: name.to_string(), args };
        Ok(Expr::new(call, expr.pos))
    }
}
