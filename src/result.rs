// src/result.rs
/*!
What one engine call hands to the mask store: the classified remainder and
the set of terminal sequences that may legally follow it.
*/

use crate::terminal::END_TERMINAL;
use bstr::BStr;
use std::collections::HashSet;
use std::fmt;

/// How the unconsumed tail of the input relates to the token boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemainderState {
    /// The remainder is a complete token (or empty); the next bytes start a
    /// fresh terminal.
    Complete,
    /// The remainder is a complete match for its terminal but might still be
    /// extended into a longer one.
    MaybeComplete,
    /// The remainder is a strict prefix of some terminal.
    Incomplete,
}

/// A sequence of one to three terminal names that may legally appear next.
/// The first element describes what the remainder itself may become.
pub type AcceptSequence = Vec<String>;

/// A constraint on the indentation of whatever follows a newline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndentationConstraint {
    /// The next line's relative indent must be one of these values.
    Accept(Vec<usize>),
    /// The next line's relative indent must exceed this value (which may be
    /// -1, meaning any indent).
    GreaterThan(isize),
}

/// The result of an incremental parse of a partial program.
#[derive(Clone)]
pub struct ParseResult {
    pub accept_sequences: HashSet<AcceptSequence>,
    /// The unconsumed suffix the mask store matches tokens against.
    pub remainder: Vec<u8>,
    pub remainder_state: RemainderState,
    /// Present only for layout-sensitive grammars, right after a newline.
    pub next_ac_indents: Option<IndentationConstraint>,
    /// Whether the parse could stop here ($END is acceptable next).
    pub function_end: bool,
}

impl ParseResult {
    /// Assemble a result from the engine's acceptable-terminal sets.
    ///
    /// `cur` holds the terminals acceptable in place of the last token,
    /// `next` those acceptable after it. In the MaybeComplete case the
    /// remainder's own terminal fans out into two-part sequences (and
    /// three-part ones with a single ignorable in the middle, which is what
    /// lets strict masking see across e.g. a space). Every ignorable
    /// terminal is also acceptable on its own at any point.
    pub fn from_accept_terminals(
        cur: &HashSet<String>,
        next: &HashSet<String>,
        remainder: Vec<u8>,
        remainder_state: RemainderState,
        next_ac_indents: Option<IndentationConstraint>,
        final_terminal: Option<&str>,
        ignore: &HashSet<String>,
    ) -> ParseResult {
        let mut seqs: HashSet<AcceptSequence> = HashSet::new();
        match remainder_state {
            RemainderState::Complete => {
                for t in next {
                    seqs.insert(vec![t.clone()]);
                }
            }
            RemainderState::Incomplete => {
                for t in cur {
                    seqs.insert(vec![t.clone()]);
                }
            }
            RemainderState::MaybeComplete => {
                for t in cur {
                    if Some(t.as_str()) == final_terminal {
                        for t2 in next {
                            seqs.insert(vec![t.clone(), t2.clone()]);
                        }
                        for tig in ignore {
                            seqs.insert(vec![t.clone(), tig.clone()]);
                            for t2 in next {
                                seqs.insert(vec![t.clone(), tig.clone(), t2.clone()]);
                            }
                        }
                    } else {
                        seqs.insert(vec![t.clone()]);
                    }
                }
            }
        }
        for tig in ignore {
            seqs.insert(vec![tig.clone()]);
        }
        let function_end = next.contains(END_TERMINAL);
        ParseResult {
            accept_sequences: seqs,
            remainder,
            remainder_state,
            next_ac_indents,
            function_end,
        }
    }

    /// Whether any accept sequence begins with this terminal.
    pub fn accepts_first(&self, terminal: &str) -> bool {
        self.accept_sequences.iter().any(|s| s[0] == terminal)
    }
}

impl fmt::Debug for ParseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseResult")
            .field("accept_sequences", &self.accept_sequences)
            .field("remainder", &BStr::new(&self.remainder))
            .field("remainder_state", &self.remainder_state)
            .field("next_ac_indents", &self.next_ac_indents)
            .field("function_end", &self.function_end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn seq(names: &[&str]) -> AcceptSequence {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn complete_uses_next_terminals() {
        let r = ParseResult::from_accept_terminals(
            &set(&["NUMBER"]),
            &set(&["PLUS", "$END"]),
            vec![],
            RemainderState::Complete,
            None,
            None,
            &set(&["WS"]),
        );
        assert!(r.accept_sequences.contains(&seq(&["PLUS"])));
        assert!(r.accept_sequences.contains(&seq(&["$END"])));
        assert!(r.accept_sequences.contains(&seq(&["WS"])));
        assert!(!r.accept_sequences.contains(&seq(&["NUMBER"])));
        assert!(r.function_end);
    }

    #[test]
    fn incomplete_uses_current_terminals() {
        let r = ParseResult::from_accept_terminals(
            &set(&["STRING"]),
            &set(&[]),
            b"'Hello".to_vec(),
            RemainderState::Incomplete,
            None,
            None,
            &set(&[]),
        );
        assert_eq!(r.accept_sequences, HashSet::from([seq(&["STRING"])]));
        assert!(!r.function_end);
    }

    #[test]
    fn maybe_complete_fans_out_on_final_terminal() {
        let r = ParseResult::from_accept_terminals(
            &set(&["NUMBER"]),
            &set(&["PLUS", "$END"]),
            b"17".to_vec(),
            RemainderState::MaybeComplete,
            None,
            Some("NUMBER"),
            &set(&["WS"]),
        );
        assert!(r.accept_sequences.contains(&seq(&["NUMBER", "PLUS"])));
        assert!(r.accept_sequences.contains(&seq(&["NUMBER", "$END"])));
        assert!(r.accept_sequences.contains(&seq(&["NUMBER", "WS"])));
        assert!(r.accept_sequences.contains(&seq(&["NUMBER", "WS", "PLUS"])));
        assert!(r.accept_sequences.contains(&seq(&["WS"])));
        assert!(!r.accept_sequences.contains(&seq(&["PLUS"])));
        assert!(r.accepts_first("NUMBER"));
        assert!(!r.accepts_first("PLUS"));
    }

    #[test]
    fn maybe_complete_other_terminals_stay_single() {
        let r = ParseResult::from_accept_terminals(
            &set(&["NAME", "KEYWORD"]),
            &set(&["EQUALS"]),
            b"x".to_vec(),
            RemainderState::MaybeComplete,
            None,
            Some("NAME"),
            &set(&[]),
        );
        assert!(r.accept_sequences.contains(&seq(&["KEYWORD"])));
        assert!(r.accept_sequences.contains(&seq(&["NAME", "EQUALS"])));
        assert!(!r.accept_sequences.contains(&seq(&["NAME"])));
    }
}
