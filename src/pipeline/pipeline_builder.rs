use crate::{
    ast::{Expr, GroupClause, JoinClause, Lambda, LimitClause, OrderClause, Position, QueryAst, SelectClause},
    config::LoweringConfig,
    lowering::{
        DataSource, FreeVariables, LoweringContext, LoweringError, MetadataKey, RecordBuilder, ScopeResolver,
        SyntaxError,
    },
    pipeline::{OrderSpec, Pipeline, QueryThunk, Statement},
};

pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Lowers a query into a thunk. Syntax errors are collected in `ctx.errors` and lowering
    /// carries on; only a defective input tree returns `Err`.
    pub fn lower(query: &QueryAst, ctx: &mut LoweringContext) -> Result<QueryThunk, LoweringError> {
        if ctx.depth() == 0 {
            let reserved = [ctx.config.metadata_binding.clone(), ctx.config.row_counter.clone()];
            ctx.names.reserve(reserved);
            ctx.names.reserve(FreeVariables::query_identifiers(query));
        }
        Self::lower_nested(query, ctx)
    }

    /// Lowers with a fresh context; any collected syntax error fails the whole compilation.
    pub fn lower_checked(query: &QueryAst, config: &LoweringConfig) -> Result<QueryThunk, LoweringError> {
        config.validate()?;
        let mut ctx = LoweringContext::new(config.clone());
        let thunk = Self::lower(query, &mut ctx)?;
        if !ctx.errors.is_empty() {
            return Err(LoweringError::Syntax(ctx.errors.take()));
        }
        Ok(thunk)
    }

    /// Lowers a query inside its own frame; used for sub-queries found in expressions and sources.
    pub fn lower_nested(query: &QueryAst, ctx: &mut LoweringContext) -> Result<QueryThunk, LoweringError> {
        ctx.push_frame();
        let pipeline = Self::lower_clauses(query, ctx);
        let frame = ctx.pop_frame()?;
        let pipeline = pipeline?;

        let mut statements = vec![Statement::DeclareMetadata {
            name: ctx.config.metadata_binding.clone(),
            table: frame.metadata,
        }];
        if frame.row_number_used {
            statements.push(Statement::DeclareCounter { name: ctx.config.row_counter.clone() });
        }
        Ok(QueryThunk::new(statements, pipeline))
    }

    fn lower_clauses(query: &QueryAst, ctx: &mut LoweringContext) -> Result<Pipeline, LoweringError> {
        let aliases = query.aliases().into_iter().map(str::to_string).collect();
        ctx.frame_mut()?.metadata.set(MetadataKey::AliasNameList, aliases);

        tracing::debug!(alias = %query.from.alias, "lowering from");
        let mut pipeline = Pipeline::From { source: ScopeResolver::resolve_value(&query.from.source, ctx)? };
        let mut source = DataSource::table(&query.from.alias);

        for join in &query.joins {
            (pipeline, source) = Self::lower_join(pipeline, source, join, ctx)?;
        }

        if let Some(clause) = &query.where_clause {
            tracing::debug!("lowering where");
            let predicate = Self::lambda(&source, &clause.predicate, ctx)?;
            pipeline = Pipeline::Where { input: Box::new(pipeline), predicate };
        }

        if let Some(group) = &query.group {
            (pipeline, source) = Self::lower_group(pipeline, source, group, ctx)?;
        }

        if let Some(order) = &query.order {
            pipeline = Self::lower_order(pipeline, &source, order, ctx)?;
        }

        if let Some(limit) = &query.limit {
            pipeline = Self::lower_limit(pipeline, limit, ctx)?;
        }

        match &query.select {
            Some(select) => {
                ctx.frame_mut()?.select_mode = true;
                let lowered = Self::lower_select(pipeline, &source, select, ctx);
                ctx.frame_mut()?.select_mode = false;
                lowered
            }
            None => {
                ctx.report(SyntaxError::new("select clause missing", Position::NONE));
                Ok(pipeline)
            }
        }
    }

    fn lower_join(
        pipeline: Pipeline,
        source: DataSource,
        join: &JoinClause,
        ctx: &mut LoweringContext,
    ) -> Result<(Pipeline, DataSource), LoweringError> {
        tracing::debug!(kind = join.kind.keyword(), alias = %join.alias, "lowering join");
        if source.aliases().contains(&join.alias) {
            ctx.report(SyntaxError::new(format!("alias '{}' is already declared", join.alias), join.pos));
        }

        let joined = Pipeline::From { source: ScopeResolver::resolve_value(&join.source, ctx)? };
        let on = match (&join.on, join.kind.requires_predicate()) {
            (Some(on), true) => Some(Self::join_predicate(&source, &join.alias, on, ctx)?),
            (None, true) => {
                let message = format!("{} requires an 'on' predicate", join.kind.keyword());
                ctx.report(SyntaxError::new(message, join.pos));
                None
            }
            (Some(on), false) => {
                ctx.report(SyntaxError::new("crossjoin does not take an 'on' predicate", on.pos));
                None
            }
            (None, false) => None,
        };

        let pipeline = Pipeline::Join { input: Box::new(pipeline), kind: join.kind, joined: Box::new(joined), on };
        let source = source.joined(&join.alias);
        Ok((pipeline, source))
    }

    /// `(left, right) -> predicate`: the left row is resolved against everything joined so far,
    /// the right row is bound directly to the joined alias.
    fn join_predicate(source: &DataSource, alias: &str, on: &Expr, ctx: &mut LoweringContext) -> Result<Lambda, LoweringError> {
        let mut resolution = ScopeResolver::resolve(source, on, ctx)?;
        let body = resolution.exprs.swap_remove(0);
        let body = ScopeResolver::bind(&resolution.bindings, body, ctx.config.inline_bindings);
        Ok(Lambda::new(vec![resolution.param, alias.to_string()], body))
    }

    fn lower_group(
        pipeline: Pipeline,
        source: DataSource,
        group: &GroupClause,
        ctx: &mut LoweringContext,
    ) -> Result<(Pipeline, DataSource), LoweringError> {
        tracing::debug!(classifiers = group.classifiers.len(), having = group.having.is_some(), "lowering groupby");
        if let Some(key_alias) = &group.key_alias {
            if source.aliases().contains(key_alias) {
                ctx.report(SyntaxError::new(format!("alias '{}' is already declared", key_alias), group.pos));
            }
        }

        let mut resolution = ScopeResolver::resolve_all(&source, &group.classifiers, ctx)?;
        let values = std::mem::take(&mut resolution.exprs);
        let (key, names) = RecordBuilder::build_record(&group.classifiers, values, MetadataKey::GroupNameList, None, ctx)?;
        let classifier = resolution.close_over(key, ctx.config.inline_bindings);

        let source = source.grouped(names, group.key_alias.clone());
        let having = match &group.having {
            Some(having) => Some(Self::lambda(&source, having, ctx)?),
            None => None,
        };

        let pipeline = Pipeline::GroupBy { input: Box::new(pipeline), classifier, having };
        Ok((pipeline, source))
    }

    fn lower_order(
        pipeline: Pipeline,
        source: &DataSource,
        order: &OrderClause,
        ctx: &mut LoweringContext,
    ) -> Result<Pipeline, LoweringError> {
        tracing::debug!(terms = order.terms.len(), "lowering orderby");
        let mut specs = Vec::with_capacity(order.terms.len());
        for term in &order.terms {
            let ascending = match &term.direction {
                None => true,
                Some(token) => match token.text.as_str() {
                    "asc" => true,
                    "desc" => false,
                    other => {
                        let message = format!("invalid order direction '{}', expected asc or desc", other);
                        ctx.report(SyntaxError::new(message, token.pos));
                        true
                    }
                },
            };
            let key = Self::lambda(source, &term.key, ctx)?;
            specs.push(OrderSpec { key, ascending });
        }
        Ok(Pipeline::OrderBy { input: Box::new(pipeline), specs })
    }

    fn lower_limit(pipeline: Pipeline, limit: &LimitClause, ctx: &mut LoweringContext) -> Result<Pipeline, LoweringError> {
        tracing::debug!("lowering limit");
        let offset = match &limit.offset {
            Some(offset) => ScopeResolver::resolve_value(offset, ctx)?,
            None => Expr::int(0),
        };
        let size = ScopeResolver::resolve_value(&limit.size, ctx)?;
        Ok(Pipeline::Limit { input: Box::new(pipeline), offset, size })
    }

    fn lower_select(
        pipeline: Pipeline,
        source: &DataSource,
        select: &SelectClause,
        ctx: &mut LoweringContext,
    ) -> Result<Pipeline, LoweringError> {
        tracing::debug!(projections = select.projections.len(), "lowering select");
        if select.projections.is_empty() {
            ctx.report(SyntaxError::new("select clause has no projections", select.pos));
            return Ok(pipeline);
        }

        let inline = ctx.config.inline_bindings;
        let mut resolution = ScopeResolver::resolve_all(source, &select.projections, ctx)?;
        let projector = if RecordBuilder::needs_record(&select.projections) {
            let values = std::mem::take(&mut resolution.exprs);
            let row = Expr::var(&resolution.param);
            let (record, _) =
                RecordBuilder::build_record(&select.projections, values, MetadataKey::SelectNameList, Some(row), ctx)?;
            resolution.close_over(record, inline)
        } else {
            let names = RecordBuilder::field_names(&select.projections);
            ctx.frame_mut()?.metadata.set(MetadataKey::SelectNameList, names);
            resolution.into_lambda(inline)
        };
        Ok(Pipeline::Select { input: Box::new(pipeline), projector })
    }

    fn lambda(source: &DataSource, expr: &Expr, ctx: &mut LoweringContext) -> Result<Lambda, LoweringError> {
        let resolution = ScopeResolver::resolve(source, expr, ctx)?;
        Ok(resolution.into_lambda(ctx.config.inline_bindings))
    }
}
