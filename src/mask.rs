// src/mask.rs
/*!
The mask store: for every position we could be at in matching every
terminal, and for every terminal that could legally come next, the binary
mask over the vocabulary of acceptable continuations.

The store is built offline by enumerating all automaton states, walking
every vocabulary token from each, and distributing the token over the
plausible next terminals. At decode time a lookup is a handful of hash-map
reads and bit-vector unions.
*/

use crate::bitmask::TokenMask;
use crate::dfa;
use crate::grammar::{Grammar, GrammarError};
use crate::parser::LrParser;
use crate::result::{IndentationConstraint, ParseResult, RemainderState};
use crate::terminal::{END_TERMINAL, Terminal};
use crate::vocab::Vocabulary;
use bstr::ByteSlice;
use log::info;
use rayon::prelude::*;
use regex_automata::dfa::Automaton;
use regex_automata::util::primitives::StateID;
use std::collections::{BTreeMap, HashMap, HashSet};

/// How to treat a token whose tail spills past the current terminal into
/// the next one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskMode {
    /// Accept the spill-over if it could be a prefix of the next terminal.
    /// Cheaper and never blocks a valid token, at the cost of occasionally
    /// letting an invalid one through (the parser catches it later).
    Overapproximate,
    /// Accept the spill-over only if it exactly completes the next terminal.
    Strict,
}

/// Options for building a mask store.
#[derive(Clone, Debug)]
pub struct MaskStoreOptions {
    pub mode: MaskMode,
    /// Whether to build the indentation maps and apply indentation
    /// constraints at query time.
    pub indentation: bool,
    /// Pattern overrides, keyed by terminal name. Lets a store be built
    /// against e.g. a simplified identifier pattern that is cheaper to
    /// enumerate than the grammar's full one.
    pub simplifications: HashMap<String, String>,
}

impl Default for MaskStoreOptions {
    fn default() -> Self {
        MaskStoreOptions {
            mode: MaskMode::Strict,
            indentation: true,
            simplifications: HashMap::new(),
        }
    }
}

/// A position in the automaton of one terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FsmState {
    /// Index of the terminal in the store's terminal list.
    pub terminal: u32,
    pub state: StateID,
}

/// The automata of all pattern terminals of a grammar, with simplification
/// overrides applied.
#[derive(Debug)]
pub struct FsmSet {
    terminals: Vec<Terminal>,
    index: HashMap<String, u32>,
}

impl FsmSet {
    pub fn new(
        terminals: &[Terminal],
        simplifications: &HashMap<String, String>,
    ) -> Result<Self, GrammarError> {
        let mut compiled = Vec::with_capacity(terminals.len());
        let mut index = HashMap::with_capacity(terminals.len());
        for (i, t) in terminals.iter().enumerate() {
            let terminal = match simplifications.get(&t.name) {
                Some(pattern) => Terminal::new(&t.name, pattern, t.priority)?,
                None => t.clone(),
            };
            index.insert(terminal.name.clone(), i as u32);
            compiled.push(terminal);
        }
        Ok(FsmSet {
            terminals: compiled,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.terminals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminals.is_empty()
    }

    pub fn terminal_name(&self, idx: u32) -> &str {
        &self.terminals[idx as usize].name
    }

    /// Every reachable state of every terminal, in deterministic order.
    pub fn states(&self) -> Vec<FsmState> {
        let mut out = Vec::new();
        for (i, t) in self.terminals.iter().enumerate() {
            for state in dfa::states(&t.dfa) {
                out.push(FsmState {
                    terminal: i as u32,
                    state,
                });
            }
        }
        out
    }

    pub fn initial(&self, terminal: u32) -> FsmState {
        FsmState {
            terminal,
            state: self.terminals[terminal as usize].start_state(),
        }
    }

    pub fn initial_by_name(&self, name: &str) -> Option<FsmState> {
        self.index.get(name).map(|&i| self.initial(i))
    }

    pub fn is_final(&self, st: FsmState) -> bool {
        self.terminals[st.terminal as usize].is_final(st.state)
    }

    pub fn consume_prefix<'a>(&self, st: FsmState, data: &'a [u8]) -> Option<&'a [u8]> {
        dfa::consume_prefix(&self.terminals[st.terminal as usize], st.state, data)
    }

    /// Run the automaton over all of `data` from `st`, or `None` if it dies.
    pub fn advance(&self, st: FsmState, data: &[u8]) -> Option<FsmState> {
        let t = &self.terminals[st.terminal as usize];
        let state = t.advance(st.state, data);
        if t.dfa.is_dead_state(state) || t.dfa.is_quit_state(state) {
            None
        } else {
            Some(FsmState {
                terminal: st.terminal,
                state,
            })
        }
    }

    /// The states each terminal's automaton reaches after consuming all of
    /// `data`; terminals that die on it are absent. An empty `data` yields
    /// every initial state.
    pub fn compute_fsm_states(&self, data: &[u8]) -> Vec<FsmState> {
        let mut out = Vec::new();
        for (i, t) in self.terminals.iter().enumerate() {
            if let Some(state) = dfa::consume_all(t, data) {
                out.push(FsmState {
                    terminal: i as u32,
                    state,
                });
            }
        }
        out
    }
}

/// The lookup tables of a built store.
///
/// Every reachable automaton state has an entry in both the overapproximate
/// and exact tables, even when empty; lookups never distinguish "missing"
/// from "nothing allowed".
#[derive(Debug)]
pub(crate) struct LookupTable {
    /// (state, next terminal) -> mask. The next terminal is an index into
    /// the store's `next_names`.
    pub(crate) table: HashMap<(FsmState, u32), TokenMask>,
    /// state -> union of all its (state, *) masks.
    pub(crate) overapprox: HashMap<FsmState, TokenMask>,
    /// state -> tokens that stay within the terminal from this state:
    /// they finish it with nothing left over, or remain a viable prefix.
    pub(crate) exact: HashMap<FsmState, TokenMask>,
    /// Leading-whitespace width -> tokens that are nothing but whitespace.
    pub(crate) whitespace_tokens: BTreeMap<usize, TokenMask>,
    /// Leading-whitespace width -> tokens with real content after it.
    pub(crate) indent_tokens: BTreeMap<usize, TokenMask>,
}

#[derive(Debug)]
pub struct MaskStore {
    pub(crate) fsms: FsmSet,
    pub(crate) lookup: LookupTable,
    pub(crate) mode: MaskMode,
    pub(crate) indentation: bool,
    pub(crate) vocab_size: usize,
    /// All terminal names a mask can be keyed on as "next": pattern
    /// terminals first (in grammar order), then declared ones, then $END.
    pub(crate) next_names: Vec<String>,
    pub(crate) next_index: HashMap<String, u32>,
    pub(crate) end_index: u32,
    pub(crate) eos_mask: TokenMask,
    pub(crate) ignore_whitespace: bool,
}

impl MaskStore {
    /// Everything derivable from the grammar and vocabulary alone, with
    /// empty lookup tables. `build` fills them by simulation; the cache
    /// loader fills them from disk.
    pub(crate) fn skeleton(
        grammar: &Grammar,
        vocab: &Vocabulary,
        options: &MaskStoreOptions,
    ) -> Result<MaskStore, GrammarError> {
        let fsms = FsmSet::new(&grammar.terminals, &options.simplifications)?;
        let mut next_names: Vec<String> =
            grammar.terminals.iter().map(|t| t.name.clone()).collect();
        next_names.extend(grammar.declared_terminals.iter().cloned());
        next_names.push(END_TERMINAL.to_string());
        let next_index: HashMap<String, u32> = next_names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as u32))
            .collect();
        let end_index = (next_names.len() - 1) as u32;

        let vocab_size = vocab.len();
        let mut eos_mask = TokenMask::zeros(vocab_size);
        for &id in vocab.special_ids() {
            if (id as usize) < vocab_size {
                eos_mask.set(id as usize);
            }
        }

        let mut lookup = LookupTable {
            table: HashMap::new(),
            overapprox: HashMap::new(),
            exact: HashMap::new(),
            whitespace_tokens: BTreeMap::new(),
            indent_tokens: BTreeMap::new(),
        };
        for st in fsms.states() {
            lookup.overapprox.insert(st, TokenMask::zeros(vocab_size));
            lookup.exact.insert(st, TokenMask::zeros(vocab_size));
        }
        if options.indentation {
            for (id, token) in vocab.tokens().iter().enumerate() {
                let (full, width) = leading_whitespace(token);
                let map = if full {
                    &mut lookup.whitespace_tokens
                } else {
                    &mut lookup.indent_tokens
                };
                map.entry(width)
                    .or_insert_with(|| TokenMask::zeros(vocab_size))
                    .set(id);
            }
        }

        Ok(MaskStore {
            fsms,
            lookup,
            mode: options.mode,
            indentation: options.indentation,
            vocab_size,
            next_names,
            next_index,
            end_index,
            eos_mask,
            ignore_whitespace: grammar.ignore_whitespace(),
        })
    }

    /// Build the store by simulating every vocabulary token from every
    /// reachable automaton state. States are independent, so the outer loop
    /// runs on the rayon pool; the merge is sequential and ordered, which
    /// keeps the result (and its serialized form) deterministic.
    pub fn build(
        grammar: &Grammar,
        vocab: &Vocabulary,
        parser: Option<&LrParser>,
        options: &MaskStoreOptions,
    ) -> Result<MaskStore, GrammarError> {
        let mut store = MaskStore::skeleton(grammar, vocab, options)?;
        let following = parser.map(|p| p.following_terminals(grammar));
        let following_idx = store.resolve_following(grammar, following.as_ref());

        let all_states = store.fsms.states();
        info!(
            "building mask store: {} states x {} tokens ({:?})",
            all_states.len(),
            vocab.len(),
            options.mode
        );
        let rows: Vec<StateRows> = all_states
            .par_iter()
            .map(|&st| store.process_state(st, vocab, &following_idx))
            .collect();

        for (st, state_rows) in all_states.into_iter().zip(rows) {
            store.insert_state_rows(st, state_rows);
        }
        Ok(store)
    }

    /// The plausible next terminals for each terminal, as sorted index
    /// lists. A terminal absent from the following map may be followed by
    /// anything; ignorables may follow everything.
    fn resolve_following(
        &self,
        grammar: &Grammar,
        following: Option<&HashMap<String, HashSet<String>>>,
    ) -> Vec<Vec<u32>> {
        let all: Vec<u32> = self
            .next_names
            .iter()
            .enumerate()
            .filter(|(_, n)| *n != END_TERMINAL)
            .map(|(i, _)| i as u32)
            .collect();
        let mut out = Vec::with_capacity(self.fsms.len());
        for i in 0..self.fsms.len() {
            let name = self.fsms.terminal_name(i as u32);
            let mut idxs: Vec<u32> = match following.and_then(|m| m.get(name)) {
                Some(names) => names
                    .iter()
                    .chain(grammar.ignore.iter())
                    .filter_map(|n| self.next_index.get(n).copied())
                    .collect(),
                None => all.clone(),
            };
            idxs.sort_unstable();
            idxs.dedup();
            out.push(idxs);
        }
        out
    }

    /// Walk every vocabulary token from one automaton state.
    fn process_state(
        &self,
        st: FsmState,
        vocab: &Vocabulary,
        following_idx: &[Vec<u32>],
    ) -> StateRows {
        let mut rows = StateRows::default();
        let is_final = self.fsms.is_final(st);
        let following = &following_idx[st.terminal as usize];

        for (id, token) in vocab.tokens().iter().enumerate() {
            let id = id as u32;
            if vocab.is_special(id) {
                // Special tokens are only ever legal where the parse could
                // stop, i.e. from a final state into $END.
                if is_final {
                    rows.push(self.end_index, id);
                }
                continue;
            }

            // The incomplete-side walk sees tabs as four spaces, matching
            // how indentation is measured.
            let expanded = token.replace(b"\t", b"    ");
            if let Some(rest) = self.fsms.consume_prefix(st, &expanded) {
                if rest.is_empty() {
                    // The token stays within the current terminal, so any
                    // plausible next terminal may follow it.
                    for &next in following {
                        rows.push(next, id);
                    }
                } else {
                    // The token spills into the next terminal. Strict mode
                    // demands the spill stay within that one terminal;
                    // overapproximate mode lets it run past a completed
                    // match of it.
                    let rest = self.strip_left_space(st, rest);
                    for &next in following {
                        let Some(init) = self.initial_of_next(next) else {
                            continue;
                        };
                        let fits = match self.mode {
                            MaskMode::Strict => self.fsms.advance(init, rest).is_some(),
                            MaskMode::Overapproximate => {
                                self.fsms.consume_prefix(init, rest).is_some()
                            }
                        };
                        if fits {
                            rows.push(next, id);
                        }
                    }
                }
            }

            // The complete-case side uses the raw bytes: the token must stay
            // entirely within the current terminal, either finishing it or
            // remaining a viable prefix of it. Viable prefixes count: at a
            // fresh terminal boundary the vocabulary may well hold no token
            // that covers the whole terminal.
            let raw = self.strip_left_space(st, token);
            if self
                .fsms
                .consume_prefix(st, raw)
                .is_some_and(|rest| rest.is_empty())
            {
                rows.exact.push(id);
            }
        }
        rows
    }

    fn insert_state_rows(&mut self, st: FsmState, rows: StateRows) {
        let mut union = TokenMask::zeros(self.vocab_size);
        for (next, ids) in rows.by_next {
            let mut mask = TokenMask::zeros(self.vocab_size);
            for id in ids {
                mask.set(id as usize);
            }
            union.union_with(&mask);
            self.lookup.table.insert((st, next), mask);
        }
        if let Some(entry) = self.lookup.overapprox.get_mut(&st) {
            entry.union_with(&union);
        }
        if let Some(entry) = self.lookup.exact.get_mut(&st) {
            for id in rows.exact {
                entry.set(id as usize);
            }
        }
    }

    /// When whitespace is ignorable, one leading space at a terminal's
    /// initial state carries no information; drop it before matching.
    fn strip_left_space<'a>(&self, st: FsmState, bytes: &'a [u8]) -> &'a [u8] {
        if self.ignore_whitespace
            && st == self.fsms.initial(st.terminal)
            && bytes.first() == Some(&b' ')
        {
            &bytes[1..]
        } else {
            bytes
        }
    }

    fn initial_of_next(&self, next: u32) -> Option<FsmState> {
        // Only pattern terminals have automata; declared terminals and $END
        // cannot absorb spilled bytes.
        if (next as usize) < self.fsms.len() {
            Some(self.fsms.initial(next))
        } else {
            None
        }
    }

    fn sequence_mask(&self, st: FsmState, next_name: &str) -> Option<&TokenMask> {
        let &next = self.next_index.get(next_name)?;
        self.lookup.table.get(&(st, next))
    }

    fn incomplete_case(&self, st: FsmState) -> Option<&TokenMask> {
        match self.mode {
            MaskMode::Overapproximate => self.lookup.overapprox.get(&st),
            MaskMode::Strict => match self.lookup.exact.get(&st) {
                Some(mask) if mask.any() => Some(mask),
                _ => self.lookup.overapprox.get(&st),
            },
        }
    }

    /// The mask of vocabulary tokens that may follow this parse result.
    /// An all-false mask is a legitimate outcome: nothing fits.
    pub fn get_accept_mask(&self, result: &ParseResult) -> TokenMask {
        let mut mask = TokenMask::zeros(self.vocab_size);
        let states = self.fsms.compute_fsm_states(&result.remainder);
        for st in &states {
            let name = self.fsms.terminal_name(st.terminal);
            for seq in &result.accept_sequences {
                if seq[0] != name {
                    continue;
                }
                let lookup = match result.remainder_state {
                    RemainderState::Complete => {
                        if seq.len() == 1 {
                            self.lookup.exact.get(st)
                        } else {
                            None
                        }
                    }
                    RemainderState::Incomplete => self.incomplete_case(*st),
                    RemainderState::MaybeComplete => match seq.len() {
                        1 => self.incomplete_case(*st),
                        2 => self.sequence_mask(*st, &seq[1]),
                        3 => {
                            // The remainder must already be a finished match
                            // before a whole ignorable can sit between it
                            // and the third terminal.
                            if self.fsms.is_final(*st) {
                                self.fsms
                                    .initial_by_name(&seq[1])
                                    .and_then(|init| self.sequence_mask(init, &seq[2]))
                            } else {
                                None
                            }
                        }
                        _ => None,
                    },
                };
                if let Some(m) = lookup {
                    mask.union_with(m);
                }
            }
        }

        if result.accepts_first(END_TERMINAL) {
            mask.union_with(&self.eos_mask);
        }
        if self.indentation {
            if let Some(constraint) = &result.next_ac_indents {
                mask.intersect_with(&self.indentation_mask(constraint));
            }
        }
        mask
    }

    /// Whether the remainder could still become the start of some accept
    /// sequence. Used to validate externally supplied text.
    pub fn is_valid_prefix(&self, result: &ParseResult) -> bool {
        let states = self.fsms.compute_fsm_states(&result.remainder);
        states.iter().any(|st| {
            result.accepts_first(self.fsms.terminal_name(st.terminal))
        })
    }

    fn indentation_mask(&self, constraint: &IndentationConstraint) -> TokenMask {
        let mut mask = TokenMask::zeros(self.vocab_size);
        match constraint {
            IndentationConstraint::Accept(indents) => {
                for indent in indents {
                    if let Some(m) = self.lookup.indent_tokens.get(indent) {
                        mask.union_with(m);
                    }
                }
                // Pure-whitespace tokens are fine as long as they don't
                // overshoot the deepest allowed indent.
                if let Some(&max) = indents.iter().max() {
                    for m in self.lookup.whitespace_tokens.range(..=max).map(|(_, m)| m) {
                        mask.union_with(m);
                    }
                }
            }
            IndentationConstraint::GreaterThan(bound) => {
                for (&width, m) in &self.lookup.indent_tokens {
                    if width as isize > *bound {
                        mask.union_with(m);
                    }
                }
                // Any whitespace keeps the indent growing.
                for m in self.lookup.whitespace_tokens.values() {
                    mask.union_with(m);
                }
            }
        }
        mask
    }

    pub fn mode(&self) -> MaskMode {
        self.mode
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

/// Per-state build output, merged sequentially after the parallel pass.
#[derive(Default)]
struct StateRows {
    by_next: BTreeMap<u32, Vec<u32>>,
    exact: Vec<u32>,
}

impl StateRows {
    fn push(&mut self, next: u32, id: u32) {
        self.by_next.entry(next).or_default().push(id);
    }
}

/// The leading-whitespace prefix of a token: whether the whole token is
/// whitespace, and the prefix's width (a tab is worth four).
fn leading_whitespace(token: &[u8]) -> (bool, usize) {
    let run = token
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    if run == 0 {
        return (false, 0);
    }
    let tabs = token[..run].iter().filter(|&&b| b == b'\t').count();
    (run == token.len(), (run - tabs) + tabs * 4)
}
