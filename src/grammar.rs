// src/grammar.rs
/*!
Programmatic grammar definitions: terminals with regex patterns, declared
(synthetic) terminals without patterns, an ignore set, and productions.
A `Grammar` is validated up front so that everything downstream can assume
its symbols are consistent.
*/

use crate::dfa;
use crate::production::Production;
use crate::terminal::{END_TERMINAL, Terminal};
use std::collections::HashSet;
use thiserror::Error;

/// Fatal configuration errors, raised while building a grammar or the
/// tables derived from it.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("terminal {name}: cannot compile pattern `{pattern}`: {reason}")]
    InvalidPattern {
        name: String,
        pattern: String,
        reason: String,
    },
    #[error("duplicate terminal definition: {0}")]
    DuplicateTerminal(String),
    #[error("unknown symbol referenced by the grammar: {0}")]
    UnknownSymbol(String),
    #[error("grammar is not LR(1): state {state} on {terminal}: {existing} conflicts with {candidate}")]
    Conflict {
        state: usize,
        terminal: String,
        existing: String,
        candidate: String,
    },
    #[error("failed to build scanner: {0}")]
    Scanner(String),
    #[error("internal error while building parse tables: {0}")]
    Internal(String),
}

/// A context-free grammar over named terminals.
#[derive(Clone, Debug)]
pub struct Grammar {
    /// The start symbol; must be the left-hand side of some production.
    pub start_symbol: String,
    /// Terminals with a pattern, recognized by the lexer.
    pub terminals: Vec<Terminal>,
    /// Terminals with no pattern, synthesized outside the lexer (e.g. indent
    /// and dedent markers). They may appear in productions.
    pub declared_terminals: Vec<String>,
    /// Names of terminals the parser never sees (whitespace, comments, ...).
    pub ignore: HashSet<String>,
    /// The productions. An empty right-hand side is an epsilon production.
    pub productions: Vec<Production>,
    /// Every symbol appearing in the productions, in first-seen order. The
    /// order is stable, which keeps LR state numbering deterministic.
    pub symbol_set: Vec<String>,
}

impl Grammar {
    pub fn new(
        start_symbol: &str,
        terminals: Vec<Terminal>,
        declared_terminals: Vec<String>,
        ignore: Vec<String>,
        productions: Vec<Production>,
    ) -> Result<Self, GrammarError> {
        let mut names: HashSet<String> = HashSet::new();
        for t in &terminals {
            if !names.insert(t.name.clone()) {
                return Err(GrammarError::DuplicateTerminal(t.name.clone()));
            }
        }
        for d in &declared_terminals {
            if !names.insert(d.clone()) {
                return Err(GrammarError::DuplicateTerminal(d.clone()));
            }
        }
        for ig in &ignore {
            if !names.contains(ig) {
                return Err(GrammarError::UnknownSymbol(ig.clone()));
            }
        }

        let lhs_set: HashSet<&str> = productions.iter().map(|p| p.lhs.as_str()).collect();
        if !lhs_set.contains(start_symbol) {
            return Err(GrammarError::UnknownSymbol(start_symbol.to_string()));
        }
        let mut symbol_set: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for p in &productions {
            if seen.insert(p.lhs.to_string()) {
                symbol_set.push(p.lhs.to_string());
            }
            for sym in p.rhs.iter() {
                if !names.contains(sym) && !lhs_set.contains(sym.as_str()) {
                    return Err(GrammarError::UnknownSymbol(sym.clone()));
                }
                if seen.insert(sym.clone()) {
                    symbol_set.push(sym.clone());
                }
            }
        }

        Ok(Grammar {
            start_symbol: start_symbol.to_string(),
            terminals,
            declared_terminals,
            ignore: ignore.into_iter().collect(),
            productions,
            symbol_set,
        })
    }

    /// Whether this symbol names a terminal (pattern, declared, or `$END`).
    pub fn is_terminal(&self, symbol: &str) -> bool {
        symbol == END_TERMINAL
            || self.terminals.iter().any(|t| t.name == symbol)
            || self.declared_terminals.iter().any(|d| d == symbol)
    }

    pub fn terminal_from_name(&self, name: &str) -> Option<&Terminal> {
        self.terminals.iter().find(|t| t.name == name)
    }

    /// Whether some ignored terminal accepts a single space. When true, the
    /// engine and the mask store treat a leading space in a remainder as
    /// insignificant.
    pub fn ignore_whitespace(&self) -> bool {
        self.ignore
            .iter()
            .filter_map(|name| self.terminal_from_name(name))
            .any(|t| {
                dfa::consume_prefix(t, t.start_state(), b" ")
                    .is_some_and(|rest| rest.is_empty())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc_grammar() -> Result<Grammar, GrammarError> {
        Grammar::new(
            "start",
            vec![
                Terminal::new("NUMBER", r"[0-9]+", 1)?,
                Terminal::new("PLUS", r"\+", 0)?,
                Terminal::new("WS", r"[ ]+", 0)?,
            ],
            vec![],
            vec!["WS".into()],
            vec![
                Production::new("start", vec!["sums"]),
                Production::new("sums", vec!["NUMBER"]),
                Production::new("sums", vec!["sums", "PLUS", "NUMBER"]),
            ],
        )
    }

    #[test]
    fn valid_grammar_builds() {
        let g = calc_grammar().unwrap();
        assert!(g.is_terminal("NUMBER"));
        assert!(g.is_terminal("$END"));
        assert!(!g.is_terminal("sums"));
        assert!(g.ignore_whitespace());
        assert_eq!(g.symbol_set, vec!["start", "sums", "NUMBER", "PLUS"]);
    }

    #[test]
    fn duplicate_terminals_rejected() {
        let err = Grammar::new(
            "start",
            vec![
                Terminal::new("A", "a", 0).unwrap(),
                Terminal::new("A", "b", 0).unwrap(),
            ],
            vec![],
            vec![],
            vec![Production::new("start", vec!["A"])],
        )
        .unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateTerminal(_)));
    }

    #[test]
    fn unknown_rhs_symbol_rejected() {
        let err = Grammar::new(
            "start",
            vec![Terminal::new("A", "a", 0).unwrap()],
            vec![],
            vec![],
            vec![Production::new("start", vec!["nonsense"])],
        )
        .unwrap_err();
        assert!(matches!(err, GrammarError::UnknownSymbol(_)));
    }

    #[test]
    fn comment_only_ignore_is_not_whitespace() {
        let g = Grammar::new(
            "start",
            vec![
                Terminal::new("A", "a", 0).unwrap(),
                Terminal::new("COMMENT", r"#[^\n]*", 0).unwrap(),
            ],
            vec![],
            vec!["COMMENT".into()],
            vec![Production::new("start", vec!["A"])],
        )
        .unwrap();
        assert!(!g.ignore_whitespace());
    }
}
