//! The capability surface that compiled fields drive.
//!
//! A validation builder implements [`SchemaBuilder`] and overrides only the
//! capabilities it actually has. Every method defaults to
//! [`Capability::Unsupported`], handing the builder back untouched so the
//! compiler can try an alias or skip the constraint.

use std::sync::Arc;

use serde_json::Value;

use crate::schema::{Pattern, Schema};

/// A value predicate handed to `custom`/`refine`.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Outcome of asking a builder for one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<B> {
    Applied(B),
    Unsupported(B),
}

impl<B> Capability<B> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Capability::Applied(_))
    }

    pub fn into_inner(self) -> B {
        match self {
            Capability::Applied(b) | Capability::Unsupported(b) => b,
        }
    }

    /// Try `alias` when this capability was unsupported.
    pub fn or_else(self, alias: impl FnOnce(B) -> Capability<B>) -> Capability<B> {
        match self {
            Capability::Unsupported(b) => alias(b),
            applied => applied,
        }
    }
}

/// Options for `min`/`max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundOptions {
    pub exclusive: bool,
}

/// Capabilities a path-addressed validation builder may expose.
///
/// Base-type selectors come first, then the constraint methods. `min` and
/// `max` are shared by strings, numbers and arrays; the compiler prefers
/// the more specific `min_items`/`max_items` when the builder has them.
#[allow(unused_variables)]
pub trait SchemaBuilder: Sized + Clone {
    fn string(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn number(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn boolean(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn array(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn object(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn date(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn literal(self, value: &Value) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn nullable(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn required(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn min(self, limit: f64, options: BoundOptions) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn max(self, limit: f64, options: BoundOptions) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn pattern(self, pattern: &Pattern) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn email(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn url(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn uuid(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn datetime(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn integer(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn multiple_of(self, divisor: f64) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn min_items(self, count: u64) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn max_items(self, count: u64) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn unique(self) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn min_properties(self, count: u64) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn max_properties(self, count: u64) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn additional_properties(self, schema: &Schema) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn property_names(self, schema: &Schema) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn custom(self, predicate: Predicate) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn refine(self, predicate: Predicate) -> Capability<Self> {
        Capability::Unsupported(self)
    }

    fn one_of(self, branches: Vec<Self>) -> Capability<Self> {
        Capability::Unsupported(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct OnlyStrings(Vec<&'static str>);

    impl SchemaBuilder for OnlyStrings {
        fn string(mut self) -> Capability<Self> {
            self.0.push("string");
            Capability::Applied(self)
        }
    }

    #[test]
    fn defaults_hand_builder_back() {
        let outcome = OnlyStrings(vec![]).number();
        assert!(!outcome.is_applied());
        assert_eq!(outcome.into_inner(), OnlyStrings(vec![]));
    }

    #[test]
    fn or_else_tries_alias_only_when_unsupported() {
        let applied = OnlyStrings(vec![]).string().or_else(SchemaBuilder::string);
        assert_eq!(applied, Capability::Applied(OnlyStrings(vec!["string"])));

        let aliased = OnlyStrings(vec![]).email().or_else(SchemaBuilder::string);
        assert_eq!(aliased, Capability::Applied(OnlyStrings(vec!["string"])));
    }
}
