//! Per-compilation state: alias allocation and floating relationship joins

use std::collections::{HashMap, HashSet};

use algebra::SourceId;
use sqltree::SqlJoin;

/// A join produced by a relationship walk, waiting for the SELECT that
/// owns its root alias.
#[derive(Debug, Clone)]
pub struct LooseJoin {
    /// Alias of the table the join's ON condition references on its left
    pub root: String,
    pub join: SqlJoin,
}

/// State of one compilation run. Aliases are allocated here so the same
/// source gets the same alias no matter how many locators reference it,
/// and two compilations of the same query are independent.
#[derive(Debug, Default)]
pub struct Context {
    counter: usize,
    aliases: HashMap<SourceId, String>,
    ref_joins: HashMap<(String, String), String>,
    left_joined: HashSet<String>,
    loose: Vec<LooseJoin>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_alias(&mut self) -> String {
        self.counter += 1;
        format!("s{}", self.counter)
    }

    /// The alias of a source, allocating one on first sight. Clones of a
    /// source share their identity and therefore their alias.
    pub fn alias_for(&mut self, id: SourceId) -> String {
        if let Some(alias) = self.aliases.get(&id) {
            return alias.clone();
        }
        let alias = self.fresh_alias();
        self.aliases.insert(id, alias.clone());
        alias
    }

    /// The alias of the relationship join `ref_name` out of `left_alias`,
    /// if one was already created. Locators sharing a relationship hop
    /// share its join.
    pub fn ref_join(&self, left_alias: &str, ref_name: &str) -> Option<String> {
        self.ref_joins
            .get(&(left_alias.to_string(), ref_name.to_string()))
            .cloned()
    }

    pub fn register_ref_join(&mut self, left_alias: &str, ref_name: &str, join_alias: String) {
        self.ref_joins
            .insert((left_alias.to_string(), ref_name.to_string()), join_alias);
    }

    /// Mark an alias as reached through a LEFT join, so joins hanging off
    /// it stay LEFT and do not drop rows where the chain is NULL.
    pub fn mark_left_joined(&mut self, alias: &str) {
        self.left_joined.insert(alias.to_string());
    }

    pub fn is_left_joined(&self, alias: &str) -> bool {
        self.left_joined.contains(alias)
    }

    pub fn push_loose(&mut self, root: String, join: SqlJoin) {
        self.loose.push(LooseJoin { root, join });
    }

    /// Remove and return the pending joins rooted at one of `visible`, in
    /// the order they were created.
    pub fn take_rooted(&mut self, visible: &[String]) -> Vec<SqlJoin> {
        let mut taken = Vec::new();
        let mut remaining = Vec::new();
        for pending in self.loose.drain(..) {
            if visible.iter().any(|v| v == &pending.root) {
                taken.push(pending.join);
            } else {
                remaining.push(pending);
            }
        }
        self.loose = remaining;
        taken
    }

    /// Aliases of joins still waiting for an owner.
    pub fn pending_aliases(&self) -> Vec<String> {
        self.loose
            .iter()
            .map(|p| p.join.source.alias().to_string())
            .collect()
    }
}
