use std::fmt;

use indexmap::IndexMap;

use crate::{ast::Expr, lowering::DataSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairSelector {
    First,
    Second,
}

impl PairSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairSelector::First => "first",
            PairSelector::Second => "second",
        }
    }
}

/// Sequence of pair projections leading from a joined row to one alias.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessPath(Vec<PairSelector>);

impl AccessPath {
    pub fn selectors(&self) -> &[PairSelector] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn then(&self, selector: PairSelector) -> Self {
        let mut selectors = self.0.clone();
        selectors.push(selector);
        Self(selectors)
    }

    /// `root.first.second...`
    pub fn apply(&self, root: Expr) -> Expr {
        self.0.iter().fold(root, |expr, selector| Expr::prop(expr, selector.as_str()))
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for selector in &self.0 {
            write!(f, ".{}", selector.as_str())?;
        }
        Ok(())
    }
}

pub type AliasPathMap = IndexMap<String, AccessPath>;

pub struct AliasPathResolver;

impl AliasPathResolver {
    /// One path per alias of a join chain, base alias first. Empty for anything but a join.
    pub fn build_paths(source: &DataSource) -> AliasPathMap {
        let mut paths = AliasPathMap::new();
        if let DataSource::Joined { .. } = source {
            Self::collect(source, AccessPath::default(), &mut paths);
        }
        paths
    }

    fn collect(source: &DataSource, prefix: AccessPath, paths: &mut AliasPathMap) {
        match source {
            DataSource::Joined { prior, alias } => {
                // the most recently joined alias is always the right element of the outer pair
                Self::collect(prior, prefix.then(PairSelector::First), paths);
                paths.insert(alias.clone(), prefix.then(PairSelector::Second));
            }
            DataSource::Table { alias } => {
                paths.insert(alias.clone(), prefix);
            }
            DataSource::Grouped(_) => {}
        }
    }
}
