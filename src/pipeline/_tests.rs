#[cfg(test)]
pub mod fixtures {
    use crate::ast::{BinaryOp, Expr, JoinKind, OrderTerm, Position, QueryAst};

    /// from n in nums select n
    pub fn plain_select() -> QueryAst {
        QueryAst::from("n", Expr::var("nums")).select(vec![Expr::var("n")])
    }

    /// from a in as innerjoin b in bs on a.id == b.id select a.id, b.name
    pub fn inner_join() -> QueryAst {
        let on = Expr::binary(BinaryOp::Eq, Expr::field("a", "id"), Expr::field("b", "id"));
        QueryAst::from("a", Expr::var("as"))
            .join(JoinKind::Inner, "b", Expr::var("bs"), Some(on))
            .select(vec![Expr::field("a", "id"), Expr::field("b", "name")])
    }

    /// from x in xs groupby x.k into g having count() > 1 select g.k, count()
    pub fn grouped_count() -> QueryAst {
        let having = Expr::binary(BinaryOp::Gt, Expr::call("count", vec![]), Expr::int(1));
        QueryAst::from("x", Expr::var("xs"))
            .group_by(vec![Expr::field("x", "k")], Some("g"), Some(having))
            .select(vec![Expr::field("g", "k"), Expr::call("count", vec![])])
    }

    /// from x in xs orderby x.v in <direction> select x
    pub fn ordered(direction: &str, pos: Position) -> QueryAst {
        QueryAst::from("x", Expr::var("xs"))
            .order_by(vec![OrderTerm::with_direction(Expr::field("x", "v"), direction, pos)])
            .select(vec![Expr::var("x")])
    }

    /// from a in as crossjoin b in bs crossjoin c in cs where c.ok select a.id
    pub fn three_way_cross() -> QueryAst {
        QueryAst::from("a", Expr::var("as"))
            .join(JoinKind::Cross, "b", Expr::var("bs"), None)
            .join(JoinKind::Cross, "c", Expr::var("cs"), None)
            .filter(Expr::field("c", "ok"))
            .select(vec![Expr::field("a", "id")])
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use crate::{
        ast::{BinaryOp, Expr, ExprKind, JoinKind, OrderTerm, Position, QueryAst},
        config::LoweringConfig,
        lowering::{LoweringContext, LoweringError, MetadataKey},
        pipeline::{Pipeline, PipelineBuilder, QueryThunk, Statement},
    };

    fn lower_with(query: &QueryAst, config: LoweringConfig) -> (QueryThunk, LoweringContext) {
        let mut ctx = LoweringContext::new(config);
        let thunk = PipelineBuilder::lower(query, &mut ctx).expect("lowering");
        (thunk, ctx)
    }

    fn lower(query: &QueryAst) -> (QueryThunk, LoweringContext) {
        lower_with(query, LoweringConfig::default())
    }

    fn names(thunk: &QueryThunk, key: MetadataKey) -> Vec<String> {
        thunk.metadata().expect("metadata statement").get(key).to_vec()
    }

    #[test]
    fn plain_source_lowers_to_from_select() {
        let q = plain_select();
        let (thunk, ctx) = lower(&q);

        assert!(ctx.errors.is_empty());
        assert_eq!(thunk.pipeline.to_string(), "from(nums).select(n -> n)");
        assert_eq!(names(&thunk, MetadataKey::AliasNameList), vec!["n"]);
        assert_eq!(names(&thunk, MetadataKey::SelectNameList), vec!["n"]);
        assert!(!thunk.declares_counter());
        assert_eq!(
            thunk.to_string(),
            "() -> { __metaDataMap = [aliasNameList: ['n'], groupNameList: [], selectNameList: ['n']]; \
             return from(nums).select(n -> n) }"
        );
    }

    #[test]
    fn inner_join_with_inlined_paths() {
        let q = inner_join();
        let (thunk, ctx) = lower_with(&q, LoweringConfig::inlined());

        assert!(ctx.errors.is_empty());
        assert_eq!(
            thunk.pipeline.to_string(),
            "from(as).innerJoin(from(bs), (a, b) -> a.id == b.id)\
             .select(__t_0 -> NamedRecord([__t_0.first.id, __t_0.second.name], \
             names=__metaDataMap['selectNameList'], aliases=__metaDataMap['aliasNameList'], row=__t_0))"
        );
        assert_eq!(names(&thunk, MetadataKey::AliasNameList), vec!["a", "b"]);
        assert_eq!(names(&thunk, MetadataKey::SelectNameList), vec!["id", "name"]);
    }

    #[test]
    fn inner_join_with_let_bindings() {
        let q = inner_join();
        let (thunk, _) = lower(&q);

        match &thunk.pipeline {
            Pipeline::Select { projector, .. } => assert_eq!(
                projector.to_string(),
                "__t_0 -> { a = __t_0.first; b = __t_0.second; NamedRecord([a.id, b.name], \
                 names=__metaDataMap['selectNameList'], aliases=__metaDataMap['aliasNameList'], row=__t_0) }"
            ),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn bindings_cover_only_referenced_aliases() {
        let q = three_way_cross();
        let (thunk, _) = lower(&q);

        let stages = thunk.pipeline.stages();
        match stages[3] {
            Pipeline::Where { predicate, .. } => {
                assert_eq!(predicate.to_string(), "__t_0 -> { c = __t_0.second; c.ok }");
            }
            other => panic!("expected Where, got {other:?}"),
        }
        match stages[4] {
            Pipeline::Select { projector, .. } => {
                assert_eq!(projector.to_string(), "__t_1 -> { a = __t_1.first.first; a.id }");
            }
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn join_over_a_join_resolves_the_left_row() {
        let on = Expr::binary(BinaryOp::Eq, Expr::field("b", "cid"), Expr::field("c", "id"));
        let q = QueryAst::from("a", Expr::var("as"))
            .join(JoinKind::Cross, "b", Expr::var("bs"), None)
            .join(JoinKind::Left, "c", Expr::var("cs"), Some(on))
            .select(vec![Expr::var("c")]);
        let (thunk, ctx) = lower(&q);

        assert!(ctx.errors.is_empty());
        match &thunk.pipeline.stages()[2] {
            Pipeline::Join { kind, on: Some(on), .. } => {
                assert_eq!(*kind, JoinKind::Left);
                assert_eq!(on.to_string(), "(__t_0, c) -> { b = __t_0.second; b.cid == c.id }");
            }
            other => panic!("expected predicated Join, got {other:?}"),
        }
    }

    #[test]
    fn cross_join_omits_the_predicate() {
        let q = three_way_cross();
        let (thunk, _) = lower(&q);
        let joins: Vec<_> = thunk.pipeline.stages().into_iter().filter(|s| matches!(s, Pipeline::Join { .. })).collect();
        assert_eq!(joins.len(), 2);
        assert!(joins.iter().all(|j| j.arity() == 1));

        let q = inner_join();
        let (thunk, _) = lower(&q);
        assert_eq!(thunk.pipeline.stages()[1].arity(), 2);
    }

    #[test]
    fn having_and_select_aggregate_over_the_group() {
        let q = grouped_count();
        let (thunk, ctx) = lower(&q);

        assert!(ctx.errors.is_empty());
        assert_eq!(names(&thunk, MetadataKey::GroupNameList), vec!["k"]);
        assert_eq!(names(&thunk, MetadataKey::SelectNameList), vec!["k", "count()"]);

        match &thunk.pipeline {
            Pipeline::Select { input, projector } => {
                assert_eq!(
                    projector.to_string(),
                    "__t_1 -> NamedRecord([__t_1.first.k, __t_1.second.count()], \
                     names=__metaDataMap['selectNameList'], aliases=__metaDataMap['aliasNameList'], row=__t_1)"
                );
                match input.as_ref() {
                    Pipeline::GroupBy { classifier, having: Some(having), .. } => {
                        assert_eq!(
                            classifier.to_string(),
                            "x -> NamedRecord([x.k], names=__metaDataMap['groupNameList'], aliases=__metaDataMap['aliasNameList'])"
                        );
                        assert_eq!(having.to_string(), "__t_0 -> __t_0.second.count() > 1");
                    }
                    other => panic!("expected GroupBy with having, got {other:?}"),
                }
            }
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn group_key_alias_reads_the_key_record() {
        let q = QueryAst::from("x", Expr::var("xs"))
            .group_by(vec![Expr::field("x", "a")], Some("g"), None)
            .select(vec![Expr::field("g", "a")]);
        let (thunk, _) = lower(&q);

        match &thunk.pipeline {
            Pipeline::Select { projector, .. } => assert_eq!(projector.to_string(), "__t_0 -> __t_0.first.a"),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn count_all_is_a_nullary_call_on_the_group() {
        let q = grouped_count();
        let (thunk, _) = lower(&q);

        let Pipeline::Select { projector, .. } = &thunk.pipeline else {
            panic!("expected Select, got {:?}", thunk.pipeline);
        };
        let ExprKind::Record { values, .. } = &projector.body.kind else {
            panic!("expected Record, got {:?}", projector.body);
        };
        match &values[1].kind {
            ExprKind::Call { receiver: Some(receiver), name, args } => {
                assert_eq!(name, "count");
                assert!(args.is_empty());
                assert_eq!(receiver.to_string(), "__t_1.second");
            }
            other => panic!("expected aggregate call, got {other:?}"),
        }
    }

    #[test]
    fn order_direction_tokens() {
        let q = ordered("desc", Position::new(1, 30));
        let (thunk, ctx) = lower(&q);
        assert!(ctx.errors.is_empty());
        match &thunk.pipeline.stages()[1] {
            Pipeline::OrderBy { specs, .. } => {
                assert_eq!(specs.len(), 1);
                assert!(!specs[0].ascending);
            }
            other => panic!("expected OrderBy, got {other:?}"),
        }
        assert_eq!(thunk.pipeline.to_string(), "from(xs).orderBy(Order(x -> x.v, false)).select(x -> x)");

        let q = ordered("xyz", Position::new(1, 30));
        let (thunk, ctx) = lower(&q);
        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors.errors()[0].position, Position::new(1, 30));
        match &thunk.pipeline.stages()[1] {
            Pipeline::OrderBy { specs, .. } => assert!(specs[0].ascending),
            other => panic!("expected OrderBy, got {other:?}"),
        }
    }

    #[test]
    fn order_terms_default_to_ascending() {
        let q = QueryAst::from("x", Expr::var("xs"))
            .order_by(vec![OrderTerm::asc(Expr::field("x", "v")), OrderTerm::with_direction(Expr::field("x", "w"), "asc", Position::NONE)])
            .select(vec![Expr::var("x")]);
        let (thunk, _) = lower(&q);
        assert_eq!(
            thunk.pipeline.to_string(),
            "from(xs).orderBy(Order(x -> x.v, true), Order(x -> x.w, true)).select(x -> x)"
        );
    }

    #[test]
    fn missing_select_is_reported_without_position() {
        let q = QueryAst::from("n", Expr::var("nums"));
        let (thunk, ctx) = lower(&q);

        assert_eq!(ctx.errors.len(), 1);
        let error = &ctx.errors.errors()[0];
        assert_eq!(error.message, "select clause missing");
        assert_eq!(error.position, Position::NONE);
        assert_eq!(thunk.pipeline.to_string(), "from(nums)");
    }

    #[test]
    fn errors_accumulate_across_clauses() {
        let q = QueryAst::from("a", Expr::var("as"))
            .join(JoinKind::Inner, "b", Expr::var("bs").at(2, 10), None)
            .join(JoinKind::Cross, "c", Expr::var("cs"), Some(Expr::boolean(true).at(3, 20)))
            .join(JoinKind::Cross, "a", Expr::var("more").at(4, 1), None)
            .order_by(vec![OrderTerm::with_direction(Expr::field("a", "v"), "up", Position::new(5, 14))]);
        let (thunk, ctx) = lower(&q);

        let positions: Vec<_> = ctx.errors.errors().iter().map(|e| e.position).collect();
        assert_eq!(
            positions,
            vec![Position::new(2, 10), Position::new(3, 20), Position::new(4, 1), Position::new(5, 14), Position::NONE]
        );
        assert!(thunk.pipeline.stages().iter().filter(|s| matches!(s, Pipeline::Join { .. })).all(|j| j.arity() == 1));
    }

    #[test]
    fn limit_offset_defaults_to_zero() {
        let q = plain_select().limit(None, Expr::int(5));
        let (thunk, _) = lower(&q);
        assert_eq!(thunk.pipeline.to_string(), "from(nums).limit(0, 5).select(n -> n)");

        let q = plain_select().limit(Some(Expr::int(10)), Expr::var("pageSize"));
        let (thunk, _) = lower(&q);
        assert_eq!(thunk.pipeline.to_string(), "from(nums).limit(10, pageSize).select(n -> n)");
    }

    #[test]
    fn row_number_declares_a_counter() {
        let q = QueryAst::from("x", Expr::var("xs"))
            .filter(Expr::binary(BinaryOp::Gt, Expr::var("_rn"), Expr::int(0)))
            .select(vec![Expr::var("_rn"), Expr::field("x", "v")]);
        let (thunk, _) = lower(&q);

        assert!(thunk.declares_counter());
        assert!(matches!(thunk.statements.last(), Some(Statement::DeclareCounter { name }) if name == "__rowNumber"));
        match &thunk.pipeline {
            Pipeline::Select { input, projector } => {
                assert!(projector.to_string().starts_with("x -> NamedRecord([__rowNumber++, x.v]"));
                assert_eq!(input.to_string(), "from(xs).where(x -> _rn > 0)");
            }
            other => panic!("expected Select, got {other:?}"),
        }
        assert_eq!(names(&thunk, MetadataKey::SelectNameList), vec!["_rn", "v"]);
    }

    #[test]
    fn nested_query_as_source_gets_its_own_metadata() {
        let inner = QueryAst::from("x", Expr::var("xs"))
            .filter(Expr::binary(BinaryOp::Gt, Expr::field("x", "v"), Expr::int(1)))
            .select(vec![Expr::var("x")]);
        let q = QueryAst::from("y", Expr::query(inner)).select(vec![Expr::var("y")]);
        let (thunk, ctx) = lower(&q);

        assert_eq!(ctx.depth(), 0);
        assert_eq!(names(&thunk, MetadataKey::AliasNameList), vec!["y"]);
        assert_eq!(
            thunk.pipeline.to_string(),
            "from((() -> { __metaDataMap = [aliasNameList: ['x'], groupNameList: [], selectNameList: ['x']]; \
             return from(xs).where(x -> x.v > 1).select(x -> x) })()).select(y -> y)"
        );
    }

    #[test]
    fn membership_in_subquery_materializes_it() {
        let inner = QueryAst::from("b", Expr::var("bs")).select(vec![Expr::field("b", "aid")]);
        let q = QueryAst::from("a", Expr::var("as"))
            .filter(Expr::binary(BinaryOp::NotIn, Expr::field("a", "id"), Expr::query(inner)))
            .select(vec![Expr::var("a")]);
        let (thunk, _) = lower(&q);

        match &thunk.pipeline.stages()[1] {
            Pipeline::Where { predicate, .. } => {
                let text = predicate.to_string();
                assert!(text.starts_with("a -> a.id !in (() -> {"), "{text}");
                assert!(text.ends_with("return from(bs).select(b -> b.aid) })().toList()"), "{text}");
            }
            other => panic!("expected Where, got {other:?}"),
        }
    }

    #[test]
    fn correlated_subquery_sees_inlined_paths() {
        let inner = QueryAst::from("c", Expr::var("cs"))
            .filter(Expr::binary(BinaryOp::Eq, Expr::field("c", "b"), Expr::field("b", "id")))
            .select(vec![Expr::field("c", "a")]);
        let q = QueryAst::from("a", Expr::var("as"))
            .join(JoinKind::Cross, "b", Expr::var("bs"), None)
            .filter(Expr::binary(BinaryOp::In, Expr::field("a", "id"), Expr::query(inner)))
            .select(vec![Expr::field("a", "id")]);

        let (thunk, _) = lower_with(&q, LoweringConfig::inlined());
        match &thunk.pipeline.stages()[2] {
            Pipeline::Where { predicate, .. } => {
                let text = predicate.to_string();
                assert!(text.starts_with("__t_0 -> __t_0.first.id in (() -> {"), "{text}");
                assert!(text.contains("from(cs).where(c -> c.b == __t_0.second.id)"), "{text}");
            }
            other => panic!("expected Where, got {other:?}"),
        }

        let (thunk, _) = lower(&q);
        match &thunk.pipeline.stages()[2] {
            Pipeline::Where { predicate, .. } => {
                let text = predicate.to_string();
                assert!(text.starts_with("__t_0 -> { a = __t_0.first; b = __t_0.second; a.id in"), "{text}");
            }
            other => panic!("expected Where, got {other:?}"),
        }
    }

    #[test]
    fn correlated_subquery_after_groupby_reads_the_key() {
        // from x in xs groupby x.k select (from y in ys where y.k == x.k select y)
        let inner = QueryAst::from("y", Expr::var("ys"))
            .filter(Expr::binary(BinaryOp::Eq, Expr::field("y", "k"), Expr::field("x", "k")))
            .select(vec![Expr::var("y")]);
        let q = QueryAst::from("x", Expr::var("xs"))
            .group_by(vec![Expr::field("x", "k")], None, None)
            .select(vec![Expr::query(inner)]);

        let (thunk, ctx) = lower(&q);
        assert!(ctx.errors.is_empty());
        match &thunk.pipeline {
            Pipeline::Select { projector, .. } => assert_eq!(
                projector.to_string(),
                "__t_0 -> { x = __t_0.first; (() -> { __metaDataMap = [aliasNameList: ['y'], groupNameList: [], selectNameList: ['y']]; \
                 return from(ys).where(y -> y.k == x.k).select(y -> y) })() }"
            ),
            other => panic!("expected Select, got {other:?}"),
        }

        let (thunk, _) = lower_with(&q, LoweringConfig::inlined());
        match &thunk.pipeline {
            Pipeline::Select { projector, .. } => assert_eq!(
                projector.to_string(),
                "__t_0 -> (() -> { __metaDataMap = [aliasNameList: ['y'], groupNameList: [], selectNameList: ['y']]; \
                 return from(ys).where(y -> y.k == __t_0.first.k).select(y -> y) })()"
            ),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn having_subquery_over_the_current_group() {
        // from x in xs groupby x.k having 1 in (from r in _g where r.v > k select r.v) select k
        let inner = QueryAst::from("r", Expr::var("_g"))
            .filter(Expr::binary(BinaryOp::Gt, Expr::field("r", "v"), Expr::var("k")))
            .select(vec![Expr::field("r", "v")]);
        let having = Expr::binary(BinaryOp::In, Expr::int(1), Expr::query(inner));
        let q = QueryAst::from("x", Expr::var("xs"))
            .group_by(vec![Expr::field("x", "k")], None, Some(having))
            .select(vec![Expr::var("k")]);

        let (thunk, ctx) = lower_with(&q, LoweringConfig::inlined());
        assert!(ctx.errors.is_empty());
        match &thunk.pipeline {
            Pipeline::Select { input, projector } => {
                assert_eq!(projector.to_string(), "__t_1 -> __t_1.first.k");
                match input.as_ref() {
                    Pipeline::GroupBy { having: Some(having), .. } => assert_eq!(
                        having.to_string(),
                        "__t_0 -> 1 in { _g = __t_0.second.withAliases(__metaDataMap['aliasNameList']); \
                         (() -> { __metaDataMap = [aliasNameList: ['r'], groupNameList: [], selectNameList: ['v']]; \
                         return from(_g).where(r -> r.v > __t_0.first.k).select(r -> r.v) })().toList() }"
                    ),
                    other => panic!("expected GroupBy with having, got {other:?}"),
                }
            }
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn nested_source_reusing_an_outer_alias() {
        // from a in as crossjoin b in bs select (from a in a.kids select a)
        let inner = QueryAst::from("a", Expr::field("a", "kids")).select(vec![Expr::var("a")]);
        let q = QueryAst::from("a", Expr::var("as"))
            .join(JoinKind::Cross, "b", Expr::var("bs"), None)
            .select(vec![Expr::query(inner)]);

        let (thunk, _) = lower(&q);
        match &thunk.pipeline {
            Pipeline::Select { projector, .. } => assert_eq!(
                projector.to_string(),
                "__t_0 -> { a = __t_0.first; (() -> { __metaDataMap = [aliasNameList: ['a'], groupNameList: [], selectNameList: ['a']]; \
                 return from(a.kids).select(a -> a) })() }"
            ),
            other => panic!("expected Select, got {other:?}"),
        }

        let (thunk, _) = lower_with(&q, LoweringConfig::inlined());
        match &thunk.pipeline {
            Pipeline::Select { projector, .. } => assert_eq!(
                projector.to_string(),
                "__t_0 -> (() -> { __metaDataMap = [aliasNameList: ['a'], groupNameList: [], selectNameList: ['a']]; \
                 return from(__t_0.first.kids).select(a -> a) })()"
            ),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn current_group_and_agg() {
        let reducer = Expr::lambda(
            vec!["rows".into()],
            Expr::method(Expr::var("rows"), "count", vec![]),
        );
        let q = QueryAst::from("x", Expr::var("xs"))
            .group_by(vec![Expr::field("x", "k")], None, None)
            .select(vec![
                Expr::var("k"),
                Expr::cast(Expr::call("agg", vec![reducer]), "n"),
                Expr::cast(Expr::method(Expr::var("_g"), "first", vec![]), "head"),
            ]);
        let (thunk, ctx) = lower(&q);

        assert!(ctx.errors.is_empty());
        assert_eq!(names(&thunk, MetadataKey::SelectNameList), vec!["k", "n", "head"]);
        match &thunk.pipeline {
            Pipeline::Select { projector, .. } => assert_eq!(
                projector.to_string(),
                "__t_0 -> NamedRecord([__t_0.first.k, __t_0.second.agg(rows -> rows.count()), \
                 __t_0.second.withAliases(__metaDataMap['aliasNameList']).first()], \
                 names=__metaDataMap['selectNameList'], aliases=__metaDataMap['aliasNameList'], row=__t_0)"
            ),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn synthetic_names_avoid_query_identifiers() {
        let q = QueryAst::from("a", Expr::var("as"))
            .join(JoinKind::Cross, "__t_0", Expr::var("bs"), None)
            .select(vec![Expr::field("a", "id")]);
        let (thunk, _) = lower(&q);
        match &thunk.pipeline {
            Pipeline::Select { projector, .. } => assert_eq!(projector.params, vec!["__t_1"]),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn lowering_twice_reuses_memoized_names() {
        let q = grouped_count();
        let mut ctx = LoweringContext::new(LoweringConfig::default());
        let first = PipelineBuilder::lower(&q, &mut ctx).expect("first");
        let second = PipelineBuilder::lower(&q, &mut ctx).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn checked_lowering_surfaces_syntax_errors() {
        let q = QueryAst::from("n", Expr::var("nums"));
        match crate::lower(&q, &LoweringConfig::default()) {
            Err(LoweringError::Syntax(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].position, Position::NONE);
            }
            other => panic!("expected Syntax error, got {other:?}"),
        }

        let q = plain_select();
        let thunk = crate::lower(&q, &LoweringConfig::default()).expect("valid query");
        assert_eq!(thunk.pipeline.to_string(), "from(nums).select(n -> n)");
    }

    #[test]
    fn output_nodes_in_the_input_abort_lowering() {
        let q = QueryAst::from("n", Expr::var("nums"))
            .select(vec![Expr::synthetic(ExprKind::PostIncrement("i".into()))]);
        let mut ctx = LoweringContext::new(LoweringConfig::default());
        match PipelineBuilder::lower(&q, &mut ctx) {
            Err(e) => assert!(e.is_internal(), "{e}"),
            other => panic!("expected internal error, got {other:?}"),
        }
        assert_eq!(ctx.depth(), 0);
    }
}
