/// Shape of the row value reaching a clause.
///
/// `Joined` nests to the left, so after `k` joins the row is `(((base, j1), j2), ...)`.
/// `Grouped` resets the shape to `(key, groupedQueryable)`; the prior source is kept only so
/// that aggregate selectors can still be resolved against one original row.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Table { alias: String },
    Joined { prior: Box<DataSource>, alias: String },
    Grouped(GroupScope),
}

/// What remains addressable once grouping is active.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupScope {
    pub prior: Box<DataSource>,
    /// Field names of the group key record, in classifier order.
    pub names: Vec<String>,
    pub key_alias: Option<String>,
}

impl DataSource {
    pub fn table(alias: impl Into<String>) -> Self {
        DataSource::Table { alias: alias.into() }
    }

    pub fn joined(self, alias: impl Into<String>) -> Self {
        DataSource::Joined { prior: Box::new(self), alias: alias.into() }
    }

    pub fn grouped(self, names: Vec<String>, key_alias: Option<String>) -> Self {
        DataSource::Grouped(GroupScope { prior: Box::new(self), names, key_alias })
    }

    /// Table aliases in declaration order; grouping keeps the aliases of its prior source.
    pub fn aliases(&self) -> Vec<String> {
        match self {
            DataSource::Table { alias } => vec![alias.clone()],
            DataSource::Joined { prior, alias } => {
                let mut aliases = prior.aliases();
                aliases.push(alias.clone());
                aliases
            }
            DataSource::Grouped(group) => group.prior.aliases(),
        }
    }

    pub fn is_grouped(&self) -> bool {
        matches!(self, DataSource::Grouped(_))
    }

    pub fn group(&self) -> Option<&GroupScope> {
        match self {
            DataSource::Grouped(group) => Some(group),
            _ => None,
        }
    }
}

impl GroupScope {
    pub fn is_table_alias(&self, name: &str) -> bool {
        self.key_alias.as_deref() == Some(name) || self.prior.aliases().iter().any(|a| a == name)
    }

    pub fn is_group_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}
