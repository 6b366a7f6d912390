use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::ast::{Expr, ExprKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Min,
    Max,
    Sum,
    Avg,
    Agg,
}

/// How an aggregate call is rewritten against the grouped queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateRule {
    /// `count()`: count every row of the group, no selector.
    CountAll,
    /// Argument becomes a per-row selector lambda over the original row shape.
    PerRowSelector,
    /// Argument is handed the whole grouped queryable.
    WholeGroup,
}

#[derive(Debug)]
pub struct AggregateEntry {
    pub kind: AggregateKind,
    /// (argument count, rule) pairs accepted by the aggregate.
    pub rules: &'static [(usize, AggregateRule)],
}

static AGGREGATES: Lazy<IndexMap<AggregateKind, AggregateEntry>> = Lazy::new(|| {
    use AggregateRule::*;
    let rules: [(AggregateKind, &'static [(usize, AggregateRule)]); 6] = [
        (AggregateKind::Count, &[(0, CountAll), (1, PerRowSelector)]),
        (AggregateKind::Min, &[(1, PerRowSelector)]),
        (AggregateKind::Max, &[(1, PerRowSelector)]),
        (AggregateKind::Sum, &[(1, PerRowSelector)]),
        (AggregateKind::Avg, &[(1, PerRowSelector)]),
        (AggregateKind::Agg, &[(1, WholeGroup)]),
    ];
    rules.into_iter().map(|(kind, rules)| (kind, AggregateEntry { kind, rules })).collect()
});

impl AggregateKind {
    /// Aggregate names are matched exactly (lowercase).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "count" => Some(AggregateKind::Count),
            "min" => Some(AggregateKind::Min),
            "max" => Some(AggregateKind::Max),
            "sum" => Some(AggregateKind::Sum),
            "avg" => Some(AggregateKind::Avg),
            "agg" => Some(AggregateKind::Agg),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateKind::Count => "count",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Sum => "sum",
            AggregateKind::Avg => "avg",
            AggregateKind::Agg => "agg",
        }
    }
}

impl AggregateEntry {
    pub fn rule_for(&self, arg_count: usize) -> Option<AggregateRule> {
        self.rules.iter().find(|(n, _)| *n == arg_count).map(|(_, rule)| *rule)
    }

    pub fn accepted_counts(&self) -> String {
        self.rules.iter().map(|(n, _)| n.to_string()).collect::<Vec<_>>().join(" or ")
    }
}

pub struct AggregateResolver;

impl AggregateResolver {
    pub fn entry(kind: AggregateKind) -> Option<&'static AggregateEntry> {
        AGGREGATES.get(&kind)
    }

    pub fn lookup(name: &str) -> Option<&'static AggregateEntry> {
        AggregateKind::from_name(name).and_then(Self::entry)
    }

    /// Unqualified aggregate call, e.g. `sum(x.v)` but not `x.items.sum()`.
    pub fn as_aggregate_call(expr: &Expr) -> Option<(&'static AggregateEntry, &[Expr])> {
        match &expr.kind {
            ExprKind::Call { receiver: None, name, args } => Self::lookup(name).map(|entry| (entry, args.as_slice())),
            _ => None,
        }
    }

    /// Follows an expression to its outermost object reference: `x.a.b.size()` gives `x`.
    pub fn root_alias(expr: &Expr) -> Option<&str> {
        match &expr.kind {
            ExprKind::Var(name) => Some(name),
            ExprKind::Property { object, .. } => Self::root_alias(object),
            ExprKind::Index { target, .. } => Self::root_alias(target),
            ExprKind::Call { receiver: Some(receiver), .. } => Self::root_alias(receiver),
            ExprKind::Cast { expr, .. } => Self::root_alias(expr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_an_entry_under_its_name() {
        let kinds = [
            AggregateKind::Count,
            AggregateKind::Min,
            AggregateKind::Max,
            AggregateKind::Sum,
            AggregateKind::Avg,
            AggregateKind::Agg,
        ];
        for kind in kinds {
            let entry = AggregateResolver::entry(kind).unwrap();
            assert_eq!(entry.kind, kind);
            assert_eq!(AggregateKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(AggregateKind::from_name("COUNT"), None);
        assert!(AggregateResolver::lookup("median").is_none());
    }

    #[test]
    fn count_is_the_only_nullary_aggregate() {
        let count = AggregateResolver::lookup("count").unwrap();
        assert_eq!(count.kind, AggregateKind::Count);
        assert_eq!(count.rule_for(0), Some(AggregateRule::CountAll));
        assert_eq!(count.rule_for(1), Some(AggregateRule::PerRowSelector));
        assert_eq!(count.rule_for(2), None);
        assert_eq!(count.accepted_counts(), "0 or 1");

        for name in ["min", "max", "sum", "avg"] {
            let entry = AggregateResolver::lookup(name).unwrap();
            assert_eq!(entry.rule_for(0), None, "{name}()");
            assert_eq!(entry.rule_for(1), Some(AggregateRule::PerRowSelector));
        }

        let agg = AggregateResolver::lookup("agg").unwrap();
        assert_eq!(agg.rule_for(1), Some(AggregateRule::WholeGroup));
    }

    #[test]
    fn only_unqualified_calls_are_aggregates() {
        assert!(AggregateResolver::as_aggregate_call(&Expr::call("sum", vec![Expr::field("x", "v")])).is_some());
        let qualified = Expr::method(Expr::field("x", "items"), "sum", vec![]);
        assert!(AggregateResolver::as_aggregate_call(&qualified).is_none());
    }

    #[test]
    fn root_alias_follows_object_chain() {
        let e = Expr::method(Expr::prop(Expr::field("x", "a"), "b"), "size", vec![]);
        assert_eq!(AggregateResolver::root_alias(&e), Some("x"));
        assert_eq!(AggregateResolver::root_alias(&Expr::int(1)), None);
        assert_eq!(AggregateResolver::root_alias(&Expr::call("f", vec![Expr::var("x")])), None);
    }
}
