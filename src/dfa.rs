// src/dfa.rs
/*!
Byte-level simulation helpers over a terminal's dense DFA: state enumeration,
liveness, and the two consumption primitives the mask store is built on.

`consume_prefix` answers "does some prefix of this data complete a match from
here, and what is left over afterwards?"; `consume_all` answers "in which
state does the automaton end up if the data is consumed entirely?".

There exists a private method on the DFA that returns an iterator over all
states; the suggested alternative is to traverse the graph manually. See
<https://github.com/rust-lang/regex/discussions/1223>.
*/

use crate::terminal::Terminal;
use regex_automata::{
    Anchored,
    dfa::{Automaton, dense},
    util::{primitives::StateID, start},
};
use std::collections::{HashMap, HashSet, VecDeque};

/// Enumerate every state reachable from the anchored start state, walking one
/// representative byte per equivalence class plus the end-of-input transition.
pub fn states(dfa: &dense::DFA<Vec<u32>>) -> Vec<StateID> {
    let Ok(start) = dfa.start_state(&start::Config::new().anchored(Anchored::Yes)) else {
        return Vec::new();
    };
    let mut seen: HashSet<StateID> = HashSet::from([start]);
    let mut queue: VecDeque<StateID> = VecDeque::from([start]);
    let mut out = vec![start];
    while let Some(state) = queue.pop_front() {
        for unit in dfa.byte_classes().representatives(0..=255) {
            let Some(byte) = unit.as_u8() else { continue };
            let next = dfa.next_state(state, byte);
            if seen.insert(next) {
                queue.push_back(next);
                out.push(next);
            }
        }
        // Special end-of-input transition.
        let eoi = dfa.next_eoi_state(state);
        if seen.insert(eoi) {
            queue.push_back(eoi);
            out.push(eoi);
        }
    }
    out
}

/// The set of states from which a match state is still reachable, computed by
/// reverse reachability from the match states over the byte transition graph.
pub fn live_states(dfa: &dense::DFA<Vec<u32>>) -> HashSet<StateID> {
    let all = states(dfa);
    let mut predecessors: HashMap<StateID, Vec<StateID>> = HashMap::new();
    for &state in &all {
        for unit in dfa.byte_classes().representatives(0..=255) {
            let Some(byte) = unit.as_u8() else { continue };
            let next = dfa.next_state(state, byte);
            predecessors.entry(next).or_default().push(state);
        }
    }
    let mut live: HashSet<StateID> = all
        .iter()
        .copied()
        .filter(|&s| dfa.is_match_state(dfa.next_eoi_state(s)))
        .collect();
    let mut queue: VecDeque<StateID> = live.iter().copied().collect();
    while let Some(state) = queue.pop_front() {
        if let Some(preds) = predecessors.get(&state) {
            for &pred in preds {
                if live.insert(pred) {
                    queue.push_back(pred);
                }
            }
        }
    }
    live
}

/// Consume the longest matching prefix of `data` starting in `state`.
///
/// Returns `Some(rest)` where `rest` is what follows the longest completed
/// match, or `Some(b"")` when no match completed but the automaton is still
/// live (the data is a viable partial match). Returns `None` when the data
/// can never extend to a match from this state.
///
/// A start state that is already a match counts as a zero-length match, so a
/// fully unmatchable `data` still comes back as `Some(data)` in that case.
pub fn consume_prefix<'a>(terminal: &Terminal, state: StateID, data: &'a [u8]) -> Option<&'a [u8]> {
    let dfa = &terminal.dfa;
    let mut cur = state;
    let mut longest: Option<usize> = if terminal.is_final(cur) { Some(0) } else { None };
    let mut dead = false;
    for (i, &byte) in data.iter().enumerate() {
        cur = dfa.next_state(cur, byte);
        if dfa.is_dead_state(cur) || dfa.is_quit_state(cur) {
            dead = true;
            break;
        }
        if terminal.is_final(cur) {
            longest = Some(i + 1);
        }
    }
    if let Some(end) = longest {
        return Some(&data[end..]);
    }
    if !dead && terminal.is_live(cur) {
        return Some(b"");
    }
    None
}

/// Run the automaton over all of `data` from its start state.
///
/// Returns the resulting state if every byte has a transition, `None` as soon
/// as the automaton dies. The end state need not be a match state.
pub fn consume_all(terminal: &Terminal, data: &[u8]) -> Option<StateID> {
    let dfa = &terminal.dfa;
    let mut cur = terminal.start_state();
    for &byte in data {
        cur = dfa.next_state(cur, byte);
        if dfa.is_dead_state(cur) || dfa.is_quit_state(cur) {
            return None;
        }
    }
    Some(cur)
}
