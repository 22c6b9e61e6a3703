// src/terminal.rs
//! Grammar terminals and their compiled byte-level DFAs.

use crate::dfa;
use crate::grammar::GrammarError;
use regex_automata::{
    Anchored,
    dfa::{Automaton, StartKind, dense},
    util::primitives::StateID,
    util::start,
};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// The distinguished end-of-input terminal.
pub const END_TERMINAL: &str = "$END";

/// A terminal of the grammar.
#[derive(Clone)]
pub struct Terminal {
    /// The name of this terminal in the grammar.
    pub name: String,
    /// The regex describing this terminal.
    pub pattern: String,
    /// This terminal's priority in lexing.
    pub priority: i32,
    /// The DFA that matches this terminal.
    pub dfa: Arc<dense::DFA<Vec<u32>>>,
    /// The anchored start state of the DFA.
    start: StateID,
    /// The states from which a match is still reachable.
    live: Arc<HashSet<StateID>>,
}

impl Terminal {
    /// Compile a terminal from its regex. A pattern that the automaton
    /// backend cannot compile is a configuration error.
    pub fn new(name: &str, pattern: &str, priority: i32) -> Result<Self, GrammarError> {
        let dfa = dense::Builder::new()
            .configure(
                dense::Config::new()
                    .minimize(true)
                    .start_kind(StartKind::Anchored),
            )
            .build(pattern)
            .map_err(|e| GrammarError::InvalidPattern {
                name: name.into(),
                pattern: pattern.into(),
                reason: e.to_string(),
            })?;
        let start = dfa
            .start_state(&start::Config::new().anchored(Anchored::Yes))
            .map_err(|e| GrammarError::InvalidPattern {
                name: name.into(),
                pattern: pattern.into(),
                reason: e.to_string(),
            })?;
        let live = dfa::live_states(&dfa);
        Ok(Terminal {
            name: name.into(),
            pattern: pattern.into(),
            priority,
            start,
            live: live.into(),
            dfa: dfa.into(),
        })
    }

    /// Get the initial state for this terminal's DFA.
    pub fn start_state(&self) -> StateID {
        self.start
    }

    /// Return the state that this terminal's DFA ends up in after consuming these bytes.
    pub fn advance(&self, mut state: StateID, bytes: &[u8]) -> StateID {
        for &b in bytes {
            state = self.dfa.next_state(state, b);
        }
        state
    }

    /// Whether the input consumed so far is a complete match for this terminal.
    pub fn is_final(&self, state: StateID) -> bool {
        self.dfa.is_match_state(self.dfa.next_eoi_state(state))
    }

    /// Whether a match is still reachable from this state.
    pub fn is_live(&self, state: StateID) -> bool {
        self.live.contains(&state)
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Terminal({}, {}, {})",
            self.name, self.pattern, self.priority
        )
    }
}

impl fmt::Debug for Terminal {
    /// We don't care about the DFA for the purpose of printing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Terminal")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("priority", &self.priority)
            .finish()
    }
}

impl Hash for Terminal {
    /// We don't care about the DFA for the purpose of hashing.
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.pattern.hash(state);
        self.priority.hash(state);
    }
}

impl PartialEq for Terminal {
    /// We don't care about the DFA for the purpose of equality comparison.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.pattern == other.pattern && self.priority == other.priority
    }
}

impl Eq for Terminal {}
