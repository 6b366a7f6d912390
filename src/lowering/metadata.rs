use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::Expr;

/// Fixed keys of the per-query metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataKey {
    #[serde(rename = "aliasNameList")]
    AliasNameList,
    #[serde(rename = "groupNameList")]
    GroupNameList,
    #[serde(rename = "selectNameList")]
    SelectNameList,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 3] = [MetadataKey::AliasNameList, MetadataKey::GroupNameList, MetadataKey::SelectNameList];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKey::AliasNameList => "aliasNameList",
            MetadataKey::GroupNameList => "groupNameList",
            MetadataKey::SelectNameList => "selectNameList",
        }
    }

    /// `<binding>['<key>']`, the lookup emitted wherever runtime navigation needs a name list.
    pub fn lookup(&self, binding: &str) -> Expr {
        Expr::index(Expr::var(binding), Expr::string(self.as_str()))
    }
}

/// Name lists filled while clauses are lowered, then frozen into the query thunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTable {
    entries: IndexMap<MetadataKey, Vec<String>>,
}

impl Default for MetadataTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataTable {
    pub fn new() -> Self {
        Self { entries: MetadataKey::ALL.iter().map(|k| (*k, Vec::new())).collect() }
    }

    pub fn set(&mut self, key: MetadataKey, names: Vec<String>) {
        self.entries.insert(key, names);
    }

    pub fn get(&self, key: MetadataKey) -> &[String] {
        self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for MetadataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.iter()
            .map(|(k, names)| {
                let names = names.iter().map(|n| format!("'{}'", n)).collect::<Vec<_>>().join(", ");
                format!("{}: [{}]", k.as_str(), names)
            })
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{}]", entries)
    }
}
