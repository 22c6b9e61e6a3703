// src/lexer.rs
//! The scanner and lexer. The lexer turns a byte string into a sequence of
//! tokens plus a flag saying whether the tail of the input failed to lex
//! (in which case the unlexed suffix is the caller's remainder).
//!
//! Ignored terminals are emitted as regular tokens with the `ignored` flag
//! set so byte positions stay accurate; the parser engine skips them.

use crate::grammar::GrammarError;
use crate::terminal::Terminal;
use crate::token::Token;
use regex_automata::dfa::{Automaton, StartKind, dense};
use regex_automata::{Anchored, util::start};
use std::collections::HashSet;

/// A multi-pattern anchored DFA over all terminals of a grammar.
///
/// Terminals are sorted by priority (highest first) and then by pattern
/// length (longest first), so that when two patterns match the same length
/// the lowest pattern index, i.e. the highest-priority terminal, wins.
pub struct Scanner {
    dfa: dense::DFA<Vec<u32>>,
    /// Terminals in pattern-index order.
    terminals: Vec<Terminal>,
}

impl Scanner {
    pub fn new(terminals: &[Terminal]) -> Result<Self, GrammarError> {
        let mut sorted = terminals.to_vec();
        sorted.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.pattern.len().cmp(&a.pattern.len()))
        });

        let patterns: Vec<&str> = sorted.iter().map(|t| t.pattern.as_str()).collect();
        let dfa = dense::Builder::new()
            .configure(
                dense::Config::new()
                    .minimize(true)
                    .start_kind(StartKind::Anchored),
            )
            .build_many(&patterns)
            .map_err(|e| GrammarError::Scanner(e.to_string()))?;

        Ok(Scanner {
            dfa,
            terminals: sorted,
        })
    }

    /// Match the next token in the input, beginning at position `pos`.
    ///
    /// Looks for the longest possible match; among equal-length matches the
    /// DFA reports the lowest pattern index, which is the highest-priority
    /// terminal by construction.
    pub fn match_token<'a>(&self, text: &'a [u8], pos: usize) -> Option<(&'a [u8], &Terminal)> {
        if pos >= text.len() {
            return None;
        }
        let rest = &text[pos..];

        let config = start::Config::new().anchored(Anchored::Yes);
        let Ok(mut state) = self.dfa.start_state(&config) else {
            return None;
        };
        if self.dfa.is_dead_state(state) {
            return None;
        }

        // (pattern_idx, length) of the best match so far.
        let mut best_match: Option<(usize, usize)> = None;
        let mut current_len = 0;

        for &byte in rest {
            state = self.dfa.next_state(state, byte);
            if self.dfa.is_dead_state(state) {
                break;
            }
            current_len += 1;

            let eoi_state = self.dfa.next_eoi_state(state);
            if self.dfa.is_match_state(eoi_state) {
                let pattern_idx = self.dfa.match_pattern(eoi_state, 0).as_usize();
                match best_match {
                    Some((_, len)) if current_len <= len => {}
                    _ => best_match = Some((pattern_idx, current_len)),
                }
            }
        }

        let (pattern_idx, match_len) = best_match?;
        let terminal = self.terminals.get(pattern_idx)?;
        Some((&rest[..match_len], terminal))
    }
}

/// The result of lexing a (possibly partial) input.
#[derive(Debug)]
pub struct LexOutput {
    /// All tokens lexed, ignored ones included (flagged).
    pub tokens: Vec<Token>,
    /// True when the tail of the input could not be lexed. The unlexed
    /// suffix starts at `end_pos`.
    pub incomplete: bool,
    /// Byte position one past the last lexed token.
    pub end_pos: usize,
}

pub struct Lexer {
    scanner: Scanner,
    ignore: HashSet<String>,
}

impl Lexer {
    /// Construct a lexer recognizing `terminals`; names in `ignore` must
    /// name one of those terminals (the grammar validates this).
    pub fn new(terminals: &[Terminal], ignore: HashSet<String>) -> Result<Self, GrammarError> {
        Ok(Lexer {
            scanner: Scanner::new(terminals)?,
            ignore,
        })
    }

    /// Lex the entire text. Lexing a partial input never fails: when the
    /// tail cannot be lexed the output is marked incomplete and the caller
    /// treats the suffix as its remainder, since it may be the prefix of a
    /// token that later additions complete.
    pub fn lex(&self, text: &[u8]) -> LexOutput {
        let mut tokens = Vec::with_capacity(text.len() / 8);
        let mut pos = 0;
        while pos < text.len() {
            match self.scanner.match_token(text, pos) {
                Some((value, terminal)) => {
                    let end_pos = pos + value.len();
                    tokens.push(Token::new(
                        value,
                        &terminal.name,
                        self.ignore.contains(&terminal.name),
                        pos,
                        end_pos,
                    ));
                    pos = end_pos;
                }
                None => {
                    return LexOutput {
                        tokens,
                        incomplete: true,
                        end_pos: pos,
                    };
                }
            }
        }
        LexOutput {
            tokens,
            incomplete: false,
            end_pos: pos,
        }
    }
}
