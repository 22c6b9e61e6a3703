// src/engine.rs
/*!
The incremental parser: lex the whole (partial) program, restore the most
recent parser snapshot that is still valid for it, feed the new tokens, and
classify whatever is left over.

Generation extends the input monotonically, so consecutive calls share a long
token prefix. Snapshots are keyed by token position and verified against the
previous call's token stream before being reused; a diverging prefix falls
back to a fresh parse.
*/

use crate::grammar::{Grammar, GrammarError};
use crate::indent::{IndentationPolicy, Indenter};
use crate::lexer::Lexer;
use crate::parser::{LrParser, ParserAdapter, ParserError};
use crate::result::{IndentationConstraint, ParseResult, RemainderState};
use crate::token::Token;
use log::warn;
use std::collections::{HashMap, HashSet};

/// Everything needed to resume parsing right after a given token.
#[derive(Clone, Debug)]
struct Snapshot {
    state_stack: Vec<usize>,
    parsed_tokens: Vec<Token>,
    cur_ac: HashSet<String>,
    next_ac: HashSet<String>,
    indent_level: Vec<usize>,
    dedent_queue: Vec<Token>,
}

pub struct IncrementalParser<P: ParserAdapter> {
    parser: P,
    lexer: Lexer,
    policy: Option<IndentationPolicy>,
    ignore: HashSet<String>,
    ignore_whitespace: bool,
    state_stack: Vec<usize>,
    /// The non-ignored tokens fed so far (indent/dedent excluded).
    parsed_tokens: Vec<Token>,
    /// The token stream of the previous call, for prefix verification.
    prev_tokens: Vec<Token>,
    snapshots: HashMap<usize, Snapshot>,
    /// Terminals acceptable in place of the last fed token.
    cur_ac: HashSet<String>,
    /// Terminals acceptable after the last fed token.
    next_ac: HashSet<String>,
    /// The indentation stack, mirroring the indenter's but advanced only as
    /// tokens are actually fed.
    indent_level: Vec<usize>,
    /// Dedents are withheld until real code follows them: at the end of a
    /// partial program a dedent may still be cancelled by a deeper
    /// continuation.
    dedent_queue: Vec<Token>,
    /// Position of the next token to feed.
    cur_pos: usize,
}

impl IncrementalParser<LrParser> {
    /// Build an engine with the grammar's own LR(1) parser.
    pub fn from_grammar(
        grammar: &Grammar,
        policy: Option<IndentationPolicy>,
    ) -> Result<Self, GrammarError> {
        let parser = LrParser::new(grammar)?;
        IncrementalParser::new(grammar, parser, policy)
    }
}

impl<P: ParserAdapter> IncrementalParser<P> {
    pub fn new(
        grammar: &Grammar,
        parser: P,
        policy: Option<IndentationPolicy>,
    ) -> Result<Self, GrammarError> {
        let lexer = Lexer::new(&grammar.terminals, grammar.ignore.clone())?;
        let mut engine = IncrementalParser {
            lexer,
            policy,
            ignore: grammar.ignore.clone(),
            ignore_whitespace: grammar.ignore_whitespace(),
            state_stack: Vec::new(),
            parsed_tokens: Vec::new(),
            prev_tokens: Vec::new(),
            snapshots: HashMap::new(),
            cur_ac: HashSet::new(),
            next_ac: HashSet::new(),
            indent_level: Vec::new(),
            dedent_queue: Vec::new(),
            cur_pos: 0,
            parser,
        };
        engine.set_initial_state();
        Ok(engine)
    }

    /// Drop all snapshots and start over, e.g. between generation sessions.
    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.prev_tokens.clear();
        self.set_initial_state();
    }

    fn set_initial_state(&mut self) {
        self.cur_pos = 0;
        self.state_stack = self.parser.initial_stack();
        self.parsed_tokens.clear();
        self.dedent_queue.clear();
        self.indent_level = vec![0];
        self.cur_ac.clear();
        self.next_ac = self.parser.acceptable_terminals(&self.state_stack);
    }

    /// Parse the partial program and report what may follow it.
    ///
    /// Never fails: lexing stops at an unlexable suffix (which becomes the
    /// remainder), and parse errors on the last token are the normal
    /// incremental case. A parse error anywhere earlier means the previous
    /// mask let an invalid token through; it is logged and the result
    /// degrades to no known next terminals.
    pub fn get_acceptable_next_terminals(&mut self, code: &[u8]) -> ParseResult {
        let lexed = self.lexer.lex(code);
        let lexing_incomplete = lexed.incomplete;
        let lexer_end = lexed.end_pos;
        let trailing_ignored = lexed.tokens.last().is_some_and(|t| t.ignored);

        let tokens = match &self.policy {
            Some(policy) => Indenter::new(policy.clone()).postlex(lexed.tokens),
            None => lexed.tokens,
        };

        self.restore_recent(&tokens);
        self.prev_tokens = tokens.clone();

        let mut parse_incomplete = false;
        while self.cur_pos < tokens.len() {
            let token = tokens[self.cur_pos].clone();
            self.cur_pos += 1;
            if token.ignored {
                continue;
            }
            if let Some(policy) = &self.policy {
                if token.terminal == policy.dedent_type {
                    self.dedent_queue.push(token);
                    continue;
                }
            }
            match self.feed_token(&token) {
                Ok(()) => self.store_snapshot(self.cur_pos - 1),
                Err(err) => {
                    parse_incomplete = true;
                    if self.cur_pos == tokens.len() {
                        // The failing token is the last one: it is simply
                        // still being written.
                        self.cur_ac = std::mem::take(&mut self.next_ac);
                    } else {
                        warn!(
                            "unexpected token {:?} at position {} of {}: {err}",
                            token,
                            self.cur_pos - 1,
                            tokens.len()
                        );
                        self.next_ac.clear();
                    }
                    break;
                }
            }
        }

        let mut final_terminal: Option<String> = None;
        let (remainder_state, remainder) = if lexing_incomplete {
            let mut tail = &code[lexer_end..];
            if self.ignore_whitespace {
                while tail.first() == Some(&b' ') {
                    tail = &tail[1..];
                }
            }
            if tail.is_empty() {
                (RemainderState::Complete, Vec::new())
            } else {
                self.cur_ac = std::mem::take(&mut self.next_ac);
                (RemainderState::Incomplete, tail.to_vec())
            }
        } else if parse_incomplete {
            match self.parsed_tokens.last() {
                Some(last) => {
                    final_terminal = Some(last.terminal.clone());
                    (RemainderState::Incomplete, last.value.to_vec())
                }
                None => (RemainderState::Complete, Vec::new()),
            }
        } else if let Some(last) = self.parsed_tokens.last() {
            if trailing_ignored {
                // The input ends in ignored text; the last parsed token is
                // sealed off and cannot be extended.
                (RemainderState::Complete, Vec::new())
            } else {
                final_terminal = Some(last.terminal.clone());
                (RemainderState::MaybeComplete, last.value.to_vec())
            }
        } else {
            (RemainderState::Complete, Vec::new())
        };

        let next_ac_indents = self.indentation_constraint(remainder_state);

        ParseResult::from_accept_terminals(
            &self.cur_ac,
            &self.next_ac,
            remainder,
            remainder_state,
            next_ac_indents,
            final_terminal.as_deref(),
            &self.ignore,
        )
    }

    /// Feed one non-ignored token, shooting any queued dedents first. An
    /// indent token only moves the indentation stack before being fed.
    fn feed_token(&mut self, token: &Token) -> Result<(), ParserError> {
        let is_indent = self
            .policy
            .as_ref()
            .is_some_and(|p| token.terminal == p.indent_type);
        if is_indent {
            if let Some(policy) = &self.policy {
                let width = policy.indent_width(&token.value);
                update_indent_levels(&mut self.indent_level, width);
            }
        } else {
            self.parsed_tokens.push(token.clone());
            let dedent_name = self.policy.as_ref().map(|p| p.dedent_type.clone());
            while self.dedent_queue.pop().is_some() {
                if self.indent_level.len() > 1 {
                    self.indent_level.pop();
                }
                if let Some(name) = &dedent_name {
                    self.parser.feed(&mut self.state_stack, name)?;
                }
            }
        }
        self.parser.feed(&mut self.state_stack, &token.terminal)
    }

    fn store_snapshot(&mut self, pos: usize) {
        self.cur_ac = std::mem::replace(
            &mut self.next_ac,
            self.parser.acceptable_terminals(&self.state_stack),
        );
        self.snapshots.insert(
            pos,
            Snapshot {
                state_stack: self.state_stack.clone(),
                parsed_tokens: self.parsed_tokens.clone(),
                cur_ac: self.cur_ac.clone(),
                next_ac: self.next_ac.clone(),
                indent_level: self.indent_level.clone(),
                dedent_queue: self.dedent_queue.clone(),
            },
        );
    }

    /// Resume from the latest snapshot within the common prefix of the new
    /// token stream and the previous one; start over if there is none.
    fn restore_recent(&mut self, tokens: &[Token]) {
        let common = tokens
            .iter()
            .zip(&self.prev_tokens)
            .take_while(|(a, b)| a == b)
            .count();
        for idx in (0..common).rev() {
            if let Some(snapshot) = self.snapshots.get(&idx) {
                let snapshot = snapshot.clone();
                self.state_stack = snapshot.state_stack;
                self.parsed_tokens = snapshot.parsed_tokens;
                self.cur_ac = snapshot.cur_ac;
                self.next_ac = snapshot.next_ac;
                self.indent_level = snapshot.indent_level;
                self.dedent_queue = snapshot.dedent_queue;
                self.cur_pos = idx + 1;
                return;
            }
        }
        self.set_initial_state();
    }

    /// Right after a newline, derive which relative indents the next line
    /// may use, from the indentation stack and the acceptability of the
    /// indent terminal. The newline terminal itself stays acceptable (its
    /// token can always grow more whitespace).
    fn indentation_constraint(
        &mut self,
        remainder_state: RemainderState,
    ) -> Option<IndentationConstraint> {
        let policy = self.policy.as_ref()?;
        if remainder_state == RemainderState::Incomplete {
            return None;
        }
        let last = self.parsed_tokens.last()?;
        if last.terminal != policy.nl_type {
            return None;
        }
        let last_line = match last.value.iter().rposition(|&b| b == b'\n') {
            Some(i) => &last.value[i + 1..],
            None => &last.value[..],
        };
        let last_indent = policy.indent_width(last_line);
        let relative: Vec<usize> = self
            .indent_level
            .iter()
            .filter(|&&level| level >= last_indent)
            .map(|&level| level - last_indent)
            .collect();

        let constraint = if self.next_ac.contains(&policy.indent_type) {
            IndentationConstraint::GreaterThan(relative.last().copied().unwrap_or(0) as isize)
        } else if self.cur_ac.contains(&policy.indent_type) {
            IndentationConstraint::GreaterThan(relative.last().copied().unwrap_or(0) as isize - 1)
        } else {
            IndentationConstraint::Accept(relative)
        };

        let nl = policy.nl_type.clone();
        self.cur_ac.insert(nl.clone());
        self.next_ac.insert(nl);
        Some(constraint)
    }
}

/// Push a deeper level; on a shallower or equal width, pop anything deeper.
fn update_indent_levels(levels: &mut Vec<usize>, width: usize) {
    match levels.last() {
        Some(&top) if width > top => levels.push(width),
        _ => {
            while levels.len() > 1 && levels.last().is_some_and(|&top| width < top) {
                levels.pop();
            }
        }
    }
}
