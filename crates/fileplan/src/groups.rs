//! Named pattern groups referenced from queries as `@name`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::EngineError;
use crate::query::{is_group_name, GroupResolver, QueryAst};

#[derive(Debug, Clone)]
struct GroupEntry {
    expression: String,
    query: QueryAst,
}

/// Registry of group definitions.
///
/// Every change bumps the generation, which result-cache keys of
/// group-referencing queries include.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<BTreeMap<String, GroupEntry>>,
    generation: AtomicU64,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines or replaces `name`. References are resolved at evaluation
    /// time, so a group may mention groups that do not exist yet.
    pub fn define(
        &self,
        name: &str,
        expression: impl Into<String>,
        query: QueryAst,
    ) -> Result<(), EngineError> {
        let name = name.strip_prefix('@').unwrap_or(name);
        if !is_group_name(name) {
            return Err(EngineError::InvalidInput(format!(
                "invalid group name {name:?}"
            )));
        }
        self.groups.write().insert(
            name.to_string(),
            GroupEntry {
                expression: expression.into(),
                query,
            },
        );
        self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(group = name, "pattern group defined");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> bool {
        let removed = self.groups.write().remove(name).is_some();
        if removed {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<QueryAst> {
        self.groups.read().get(name).map(|entry| entry.query.clone())
    }

    pub fn expression(&self, name: &str) -> Option<String> {
        self.groups
            .read()
            .get(name)
            .map(|entry| entry.expression.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl GroupResolver for GroupRegistry {
    fn resolve_group(&self, group: &str) -> Option<QueryAst> {
        self.get(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Field, GlobPattern, Operator, QueryNode, Value};

    fn query() -> QueryAst {
        QueryAst::new(
            QueryNode::compare(
                Field::Name,
                Operator::Like,
                Value::Pattern(GlobPattern::literal("*.pdf")),
            ),
            false,
        )
    }

    #[test]
    fn define_bumps_generation() {
        let registry = GroupRegistry::new();
        assert_eq!(registry.generation(), 0);
        registry.define("@docs", "*.pdf", query()).unwrap();
        assert_eq!(registry.generation(), 1);
        assert!(registry.resolve_group("docs").is_some());
        assert_eq!(registry.expression("docs").as_deref(), Some("*.pdf"));
        assert!(registry.remove("docs"));
        assert!(!registry.remove("docs"));
        assert_eq!(registry.generation(), 2);
    }

    #[test]
    fn rejects_invalid_names() {
        let registry = GroupRegistry::new();
        assert!(matches!(
            registry.define("bad name", "*.pdf", query()),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
