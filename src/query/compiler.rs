//! Lowers a constraint tree into a store filter.
//!
//! Compilation is structural: the constraint is first lowered to a
//! fragment tree, and only the final render walk emits SQL text and the
//! ordered parameter list. Nested And/Or/Not therefore compose without
//! ever re-scanning an already-built child.
//!
//! Each metadata predicate is a correlated row test against the
//! `metadata` table for the entry under consideration, so predicates on
//! different keys conjoin the way callers expect while the query stays
//! one filtered scan over `entries`.
//!
//! `RandomMatch` is resolved here, once per compilation: a single draw
//! against the probability decides between an always-true and an
//! always-false fragment for the entire query. It is a one-shot gate on
//! the whole result set, not per-row sampling.

use crate::media::MetaValue;
use crate::query::Constraint;
use rand::Rng;
use rusqlite::types::Value;

/// A compiled filter: a WHERE-clause fragment over `entries`, plus its
/// bound parameters in order.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub clause: String,
    pub params: Vec<Value>,
}

/// Intermediate fragment tree. Parameters stay attached to their
/// predicate until the render walk binds them in clause order.
enum Fragment {
    True,
    False,
    Not(Box<Fragment>),
    All(Vec<Fragment>),
    AnyOf(Vec<Fragment>),
    Predicate {
        clause: &'static str,
        params: Vec<Value>,
    },
}

const HAS: &str = "(EXISTS (SELECT 1 FROM metadata WHERE metadata.entry_id = entries.id \
                   AND metadata.name = ?))";
const EQUALS: &str = "(EXISTS (SELECT 1 FROM metadata WHERE metadata.entry_id = entries.id \
                      AND metadata.name = ? AND ? = metadata.value))";
const GREATER: &str = "(EXISTS (SELECT 1 FROM metadata WHERE metadata.entry_id = entries.id \
                       AND metadata.name = ? AND ? > metadata.value))";
const LESS: &str = "(EXISTS (SELECT 1 FROM metadata WHERE metadata.entry_id = entries.id \
                    AND metadata.name = ? AND ? < metadata.value))";
const CONTAINS: &str = "(EXISTS (SELECT 1 FROM metadata WHERE metadata.entry_id = entries.id \
                        AND metadata.value = ?))";
const REGEX: &str = "(EXISTS (SELECT 1 FROM metadata WHERE metadata.entry_id = entries.id \
                     AND metadata.name = ? AND metadata.value REGEXP ?))";
const GLOB: &str = "(EXISTS (SELECT 1 FROM metadata WHERE metadata.entry_id = entries.id \
                    AND metadata.name = ? AND metadata.value GLOB ?))";

/// Compiles `constraint` into a filter, drawing any random gates from
/// `rng`.
pub fn compile(constraint: &Constraint, rng: &mut impl Rng) -> QueryFilter {
    let fragment = lower(constraint, rng);
    let mut clause = String::new();
    let mut params = Vec::new();
    render(fragment, &mut clause, &mut params);
    QueryFilter { clause, params }
}

fn lower(constraint: &Constraint, rng: &mut impl Rng) -> Fragment {
    match constraint {
        Constraint::Any => Fragment::True,
        Constraint::Nothing => Fragment::False,
        Constraint::Not(inner) => Fragment::Not(Box::new(lower(inner, rng))),
        Constraint::And(children) => {
            Fragment::All(children.iter().map(|c| lower(c, rng)).collect())
        }
        Constraint::Or(children) => {
            Fragment::AnyOf(children.iter().map(|c| lower(c, rng)).collect())
        }
        Constraint::RandomMatch(chance) => {
            if rng.random_range(0..100u32) < *chance as u32 {
                Fragment::True
            } else {
                Fragment::False
            }
        }
        Constraint::Has(key) => Fragment::Predicate {
            clause: HAS,
            params: vec![Value::Text(key.clone())],
        },
        Constraint::Equals(key, value) => Fragment::Predicate {
            clause: EQUALS,
            params: vec![Value::Text(key.clone()), value.into()],
        },
        Constraint::GreaterThan(key, value) => Fragment::Predicate {
            clause: GREATER,
            params: vec![Value::Text(key.clone()), value.into()],
        },
        Constraint::LessThan(key, value) => Fragment::Predicate {
            clause: LESS,
            params: vec![Value::Text(key.clone()), value.into()],
        },
        // Tests the key field against metadata *values*; key names are
        // never consulted.
        Constraint::Contains(key) => Fragment::Predicate {
            clause: CONTAINS,
            params: vec![Value::Text(key.clone())],
        },
        Constraint::Regex(key, pattern) => Fragment::Predicate {
            clause: REGEX,
            params: vec![Value::Text(key.clone()), Value::Text(pattern.clone())],
        },
        Constraint::Glob(key, pattern) => Fragment::Predicate {
            clause: GLOB,
            params: vec![Value::Text(key.clone()), Value::Text(pattern.clone())],
        },
    }
}

/// Emits SQL text and binds parameters in clause order. Children of a
/// conjunction/disjunction contribute their parameters in child order.
fn render(fragment: Fragment, clause: &mut String, params: &mut Vec<Value>) {
    match fragment {
        Fragment::True => clause.push_str("1=1"),
        Fragment::False => clause.push_str("1=0"),
        Fragment::Not(inner) => {
            clause.push_str("NOT (");
            render(*inner, clause, params);
            clause.push(')');
        }
        Fragment::All(children) => render_set(children, " AND ", "1=1", clause, params),
        Fragment::AnyOf(children) => render_set(children, " OR ", "1=0", clause, params),
        Fragment::Predicate {
            clause: text,
            params: mut bound,
        } => {
            clause.push_str(text);
            params.append(&mut bound);
        }
    }
}

fn render_set(
    children: Vec<Fragment>,
    join: &str,
    empty: &str,
    clause: &mut String,
    params: &mut Vec<Value>,
) {
    if children.is_empty() {
        clause.push_str(empty);
        return;
    }
    clause.push('(');
    let last = children.len() - 1;
    for (i, child) in children.into_iter().enumerate() {
        render(child, clause, params);
        if i != last {
            clause.push_str(join);
        }
    }
    clause.push(')');
}
