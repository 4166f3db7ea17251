//! Query constraints for searching media collections.
//!
//! A [`Constraint`] is an immutable predicate tree built by callers and
//! lowered to a store filter by the [`compiler`]. Composite constraints
//! nest arbitrarily; metadata predicates are row-existence tests against
//! the cached metadata table, so predicates on different keys compose.

pub mod compiler;

pub use compiler::{compile, QueryFilter};

use crate::media::MetaValue;

/// A composable predicate over cached media entries.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Matches any and everything.
    Any,
    /// Doesn't match anything.
    Nothing,
    /// Inverts the inner constraint.
    Not(Box<Constraint>),
    /// Matches only if all sub-constraints match. Empty matches everything.
    And(Vec<Constraint>),
    /// Matches if any sub-constraint matches. Empty matches nothing.
    Or(Vec<Constraint>),
    /// Given a probability from 0 to 100, randomly matches — resolved once
    /// per query invocation, never per row.
    RandomMatch(u8),
    /// Matches if metadata with the key exists.
    Has(String),
    /// Matches if the metadata value for the key equals the value.
    Equals(String, MetaValue),
    /// Matches if the constraint value is greater than the stored value.
    GreaterThan(String, MetaValue),
    /// Matches if the constraint value is less than the stored value.
    LessThan(String, MetaValue),
    /// Matches if any metadata *value* equals this constraint's key field.
    /// The key is never compared against metadata key names.
    Contains(String),
    /// Matches if the regex pattern matches the metadata value for the key.
    Regex(String, String),
    /// Matches if the glob pattern matches the metadata value for the key.
    Glob(String, String),
}

impl Constraint {
    /// Convenience constructor for [`Constraint::Not`].
    pub fn negate(self) -> Constraint {
        Constraint::Not(Box::new(self))
    }

    /// Convenience constructor for [`Constraint::Equals`].
    pub fn equals(key: impl Into<String>, value: impl Into<MetaValue>) -> Constraint {
        Constraint::Equals(key.into(), value.into())
    }

    /// Convenience constructor for [`Constraint::Has`].
    pub fn has(key: impl Into<String>) -> Constraint {
        Constraint::Has(key.into())
    }
}
