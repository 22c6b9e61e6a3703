// src/production.rs
//! A context-free production, the unit the item-set construction in
//! [`crate::table`] works over.

use std::sync::Arc;

/// One production of the grammar.
///
/// Both sides sit behind `Arc` because the LR item-set construction clones a
/// production into every item and lookahead variant derived from it.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Production {
    /// The nonterminal being defined.
    pub lhs: Arc<String>,
    /// The symbols it expands to, terminals and nonterminals mixed. Empty
    /// means epsilon.
    pub rhs: Arc<Vec<String>>,
}

impl Production {
    pub fn new(lhs: &str, rhs: Vec<&str>) -> Production {
        Production {
            lhs: lhs.to_string().into(),
            rhs: rhs
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<String>>()
                .into(),
        }
    }

    /// An epsilon production for `lhs`.
    pub fn epsilon(lhs: &str) -> Production {
        Production::new(lhs, vec![])
    }

    /// Whether this production derives the empty string directly.
    pub fn is_epsilon(&self) -> bool {
        self.rhs.is_empty()
    }
}
