// src/parser.rs
//! The LR(1) shift/reduce driver, behind a small adapter trait so the
//! incremental engine never touches the tables directly.

use crate::grammar::{Grammar, GrammarError};
use crate::table::{Action, ActionTable, GotoTable, tables};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Internal parser failures. These never escape an engine call: an
/// unexpected terminal at the end of the input is the normal incremental
/// case, and anywhere else it is logged and degraded.
#[derive(Debug, Clone, Error)]
pub enum ParserError {
    #[error("unexpected terminal {terminal} in state {state}")]
    UnexpectedTerminal { terminal: String, state: usize },
    #[error("parser state stack underflow")]
    StackUnderflow,
    #[error("missing goto for nonterminal {symbol} in state {state}")]
    MissingGoto { symbol: String, state: usize },
}

/// What the incremental engine needs from a parser: feed one terminal
/// through an explicit state stack, and introspect what is acceptable.
pub trait ParserAdapter {
    /// The stack a fresh parse starts from.
    fn initial_stack(&self) -> Vec<usize>;

    /// Run reductions and the final shift for one terminal, mutating the
    /// stack in place. On error the stack is left as the reductions made it;
    /// callers that need rollback keep their own snapshots.
    fn feed(&self, stack: &mut Vec<usize>, terminal: &str) -> Result<(), ParserError>;

    /// The terminals the parser will accept with this stack.
    fn acceptable_terminals(&self, stack: &[usize]) -> HashSet<String>;
}

/// A table-driven canonical LR(1) parser.
pub struct LrParser {
    pub action_table: ActionTable,
    pub goto_table: GotoTable,
    start_state: usize,
}

impl LrParser {
    pub fn new(grammar: &Grammar) -> Result<LrParser, GrammarError> {
        let (action_table, goto_table) = tables(grammar)?;
        Ok(LrParser {
            action_table,
            goto_table,
            start_state: 0,
        })
    }

    /// For each terminal, the set of terminals that may legally follow it in
    /// some state: whenever the terminal shifts into a state, everything
    /// acceptable in that state follows it. Ignorable terminals may appear
    /// anywhere, so they follow everything.
    pub fn following_terminals(&self, grammar: &Grammar) -> HashMap<String, HashSet<String>> {
        let mut map: HashMap<String, HashSet<String>> = HashMap::new();
        for ((_, terminal), action) in &self.action_table {
            if let Action::Shift(next_state) = action {
                let entry = map.entry(terminal.clone()).or_default();
                entry.extend(
                    self.action_table
                        .keys()
                        .filter(|(state, _)| state == next_state)
                        .map(|(_, t)| t.clone()),
                );
            }
        }
        for followers in map.values_mut() {
            for ig in &grammar.ignore {
                followers.insert(ig.clone());
            }
        }
        map
    }
}

impl ParserAdapter for LrParser {
    fn initial_stack(&self) -> Vec<usize> {
        vec![self.start_state]
    }

    fn feed(&self, stack: &mut Vec<usize>, terminal: &str) -> Result<(), ParserError> {
        loop {
            let Some(&state) = stack.last() else {
                return Err(ParserError::StackUnderflow);
            };
            let Some(action) = self.action_table.get(&(state, terminal.to_string())) else {
                return Err(ParserError::UnexpectedTerminal {
                    terminal: terminal.to_string(),
                    state,
                });
            };
            match action {
                Action::Shift(next_state) => {
                    stack.push(*next_state);
                    return Ok(());
                }
                Action::Reduce(rule) => {
                    for _ in 0..rule.rhs.len() {
                        if stack.pop().is_none() {
                            return Err(ParserError::StackUnderflow);
                        }
                    }
                    let Some(&current) = stack.last() else {
                        return Err(ParserError::StackUnderflow);
                    };
                    let Some(&next_state) =
                        self.goto_table.get(&(current, rule.lhs.to_string()))
                    else {
                        return Err(ParserError::MissingGoto {
                            symbol: rule.lhs.to_string(),
                            state: current,
                        });
                    };
                    stack.push(next_state);
                }
                Action::Accept => return Ok(()),
            }
        }
    }

    fn acceptable_terminals(&self, stack: &[usize]) -> HashSet<String> {
        let Some(&state) = stack.last() else {
            return HashSet::new();
        };
        self.action_table
            .keys()
            .filter(|(s, _)| *s == state)
            .map(|(_, terminal)| terminal.clone())
            .collect()
    }
}
