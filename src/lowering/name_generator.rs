use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::Expr;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static TYPE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9_]*$").unwrap());

/// Identity of an input expression node. The input tree outlives the compilation, so node
/// addresses are stable and unique for the whole pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprKey(usize);

impl ExprKey {
    pub fn of(expr: &Expr) -> Self {
        Self(std::ptr::from_ref(expr) as usize)
    }
}

/// Collision-free synthetic names for one top-level compilation.
#[derive(Debug)]
pub struct NameGenerator {
    prefix: String,
    next: usize,
    reserved: HashSet<String>,
    assigned: HashMap<ExprKey, String>,
}

impl NameGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), next: 0, reserved: HashSet::new(), assigned: HashMap::new() }
    }

    pub fn is_identifier(name: &str) -> bool {
        IDENTIFIER.is_match(name)
    }

    /// Capitalized identifiers name types and are never rewritten.
    pub fn is_type_identifier(name: &str) -> bool {
        TYPE_IDENTIFIER.is_match(name)
    }

    /// Names that generated identifiers must never shadow.
    pub fn reserve<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(names.into_iter().map(Into::into));
    }

    pub fn fresh(&mut self) -> String {
        loop {
            let candidate = format!("{}_{}", self.prefix, self.next);
            self.next += 1;
            if self.reserved.insert(candidate.clone()) {
                tracing::trace!(name = %candidate, "allocated synthetic name");
                return candidate;
            }
        }
    }

    /// Memoized per expression: asking twice for the same node yields the same name.
    pub fn name_for(&mut self, expr: &Expr) -> String {
        let key = ExprKey::of(expr);
        if let Some(name) = self.assigned.get(&key) {
            return name.clone();
        }
        let name = self.fresh();
        self.assigned.insert(key, name.clone());
        name
    }
}
