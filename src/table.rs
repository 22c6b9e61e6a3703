// src/table.rs
//! Canonical LR(1) action and goto table construction, for the use of the
//! parser in [`crate::parser`].
//!
//! Based on the relevant sections of the Dragon Book, 2e. Conflicts are
//! reported as [`GrammarError::Conflict`] rather than tolerated: a grammar
//! that is not LR(1) is a configuration error.

use crate::grammar::{Grammar, GrammarError};
use crate::production::Production;
use crate::terminal::END_TERMINAL;
use log::debug;
use std::collections::{HashMap, HashSet};

pub(crate) const AUGMENTED_START_SYMBOL: &str = "%start";

/// An item of the item set for LR parsing.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Item {
    /// The production that this item contains.
    pub production: Production,
    /// The position of the dot. Invariant: in [0, production.rhs.len()].
    pub dot: usize,
    /// The lookahead terminal.
    pub lookahead: String,
}

/// What the parser does on seeing a terminal in a state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Consume the terminal and go to the indicated state.
    Shift(usize),
    /// Reduce the symbols on the stack according to the production.
    Reduce(Production),
    /// Accept the input.
    Accept,
}

/// A map from a (state_id, terminal) pair to an action.
pub type ActionTable = HashMap<(usize, String), Action>;

/// A map from a (state_id, nonterminal) pair to a state_id.
pub type GotoTable = HashMap<(usize, String), usize>;

/// Construct the first set of a given symbol.
///
/// Sec. 4.4.2 of the Dragon Book 2e, p. 221. The empty string stands in for
/// epsilon. `visiting` guards against looping on left-recursive grammars;
/// symbols currently being expanded contribute nothing to their own set.
fn symbol_first(symbol: &str, grammar: &Grammar, visiting: &mut HashSet<String>) -> HashSet<String> {
    if symbol.is_empty() || grammar.is_terminal(symbol) {
        return HashSet::from([symbol.to_string()]);
    }
    if !visiting.insert(symbol.to_string()) {
        return HashSet::new();
    }
    let mut first_set = HashSet::new();
    for production in grammar.productions.iter().filter(|p| *p.lhs == symbol) {
        if production.is_epsilon() {
            first_set.insert(String::new());
            continue;
        }
        let mut all_nullable = true;
        for inner in production.rhs.iter() {
            let first = symbol_first(inner, grammar, visiting);
            let nullable = first.contains("");
            first_set.extend(first.into_iter().filter(|s| !s.is_empty()));
            if !nullable {
                all_nullable = false;
                break;
            }
        }
        if all_nullable {
            first_set.insert(String::new());
        }
    }
    visiting.remove(symbol);
    first_set
}

/// Compute the first set of a string of symbols, per sec. 4.4.2 of the
/// Dragon Book: take the non-epsilon symbols of each prefix symbol's first
/// set for as long as epsilon stays derivable.
fn string_first(string: &[String], grammar: &Grammar) -> HashSet<String> {
    let mut first_set: HashSet<String> = HashSet::new();
    for (idx, outer) in string.iter().enumerate() {
        let first = symbol_first(outer, grammar, &mut HashSet::new());
        let nullable = first.contains("");
        first_set.extend(first.into_iter().filter(|s| !s.is_empty()));
        if !nullable {
            break;
        }
        if idx == string.len() - 1 {
            first_set.insert(String::new());
        }
    }
    first_set
}

/// Compute the closure of a set of items.
///
/// Sec. 4.7.2 of the Dragon Book 2e, p. 261.
pub(crate) fn closure(items: HashSet<Item>, grammar: &Grammar) -> HashSet<Item> {
    let mut item_set: HashSet<Item> = items;
    loop {
        let mut new_items: Vec<Item> = Vec::new();
        for item in &item_set {
            if item.dot == item.production.rhs.len() {
                continue;
            }
            let after_dot = &item.production.rhs[item.dot];
            for production in grammar.productions.iter().filter(|p| *p.lhs == *after_dot) {
                // The symbols after the one after the dot, followed by the
                // item's lookahead.
                let mut rest: Vec<String> = item.production.rhs[(item.dot + 1)..].to_vec();
                rest.push(item.lookahead.clone());
                for terminal in string_first(&rest, grammar) {
                    if terminal.is_empty() {
                        continue;
                    }
                    let candidate = Item {
                        production: production.clone(),
                        dot: 0,
                        lookahead: terminal,
                    };
                    if !item_set.contains(&candidate) {
                        new_items.push(candidate);
                    }
                }
            }
        }
        if new_items.is_empty() {
            return item_set;
        }
        item_set.extend(new_items);
    }
}

/// Compute the goto set for an item set over a symbol.
///
/// Dragon Book 2e, sec. 4.7.2, p. 261.
fn goto(items: &HashSet<Item>, symbol: &str, grammar: &Grammar) -> HashSet<Item> {
    let mut advanced: HashSet<Item> = HashSet::new();
    for item in items {
        if item.dot == item.production.rhs.len() {
            continue;
        }
        if item.production.rhs[item.dot] == symbol {
            advanced.insert(Item {
                production: item.production.clone(),
                dot: item.dot + 1,
                lookahead: item.lookahead.clone(),
            });
        }
    }
    closure(advanced, grammar)
}

/// Compute the canonical collection of LR(1) item sets for the augmented
/// grammar. State ids are positions in the returned vec; iteration order
/// over `symbol_set` is stable, so state numbering is deterministic.
fn items(grammar: &Grammar) -> Vec<HashSet<Item>> {
    let augmented = Item {
        production: Production::new(AUGMENTED_START_SYMBOL, vec![grammar.start_symbol.as_str()]),
        dot: 0,
        lookahead: END_TERMINAL.to_string(),
    };
    let mut item_sets = vec![closure(HashSet::from([augmented]), grammar)];

    loop {
        let mut new_sets: Vec<HashSet<Item>> = Vec::new();
        for item_set in &item_sets {
            for symbol in &grammar.symbol_set {
                let goto_set = goto(item_set, symbol, grammar);
                if !goto_set.is_empty()
                    && !item_sets.contains(&goto_set)
                    && !new_sets.contains(&goto_set)
                {
                    new_sets.push(goto_set);
                }
            }
        }
        if new_sets.is_empty() {
            return item_sets;
        }
        item_sets.append(&mut new_sets);
    }
}

/// Construct the parsing tables for a grammar.
///
/// Algorithm 4.56 from Dragon Book 2e, sec. 4.7.3, p. 265.
pub fn tables(grammar: &Grammar) -> Result<(ActionTable, GotoTable), GrammarError> {
    let item_sets = items(grammar);
    let mut action_table: ActionTable = HashMap::new();
    let mut goto_table: GotoTable = HashMap::new();

    for (state_id, item_set) in item_sets.iter().enumerate() {
        for item in item_set {
            if item.dot < item.production.rhs.len() {
                let symbol = &item.production.rhs[item.dot];
                if grammar.is_terminal(symbol) {
                    let goto_set = goto(item_set, symbol, grammar);
                    let goto_state_id = find_state_id(&goto_set, &item_sets).ok_or_else(|| {
                        GrammarError::Internal(format!(
                            "no state id for goto({state_id}, {symbol})"
                        ))
                    })?;
                    checked_insert(
                        state_id,
                        symbol,
                        Action::Shift(goto_state_id),
                        &mut action_table,
                    )?;
                }
                continue;
            }
            // Dot at the end: reduce, or accept for the augmented start.
            if *item.production.lhs == AUGMENTED_START_SYMBOL {
                if item.lookahead == END_TERMINAL {
                    checked_insert(state_id, END_TERMINAL, Action::Accept, &mut action_table)?;
                }
            } else {
                checked_insert(
                    state_id,
                    &item.lookahead,
                    Action::Reduce(item.production.clone()),
                    &mut action_table,
                )?;
            }
        }

        for symbol in &grammar.symbol_set {
            if grammar.is_terminal(symbol) {
                continue;
            }
            let goto_set = goto(item_set, symbol, grammar);
            if let Some(goto_state_id) = find_state_id(&goto_set, &item_sets) {
                goto_table.insert((state_id, symbol.clone()), goto_state_id);
            }
        }
    }

    Ok((action_table, goto_table))
}

/// Find the state_id of this item set: its position in the canonical
/// collection. Empty or unknown sets have no id.
fn find_state_id(item_set: &HashSet<Item>, item_sets: &[HashSet<Item>]) -> Option<usize> {
    if item_set.is_empty() {
        return None;
    }
    item_sets.iter().position(|candidate| candidate == item_set)
}

/// Insert an action, treating a different existing action for the same
/// (state, terminal) pair as an LR(1) conflict.
fn checked_insert(
    state_id: usize,
    terminal: &str,
    action: Action,
    table: &mut ActionTable,
) -> Result<(), GrammarError> {
    if let Some(existing) = table.get(&(state_id, terminal.to_string())) {
        if *existing == action {
            debug!("duplicate action for state {state_id} on {terminal}: {action:?}");
            return Ok(());
        }
        return Err(GrammarError::Conflict {
            state: state_id,
            terminal: terminal.to_string(),
            existing: format!("{existing:?}"),
            candidate: format!("{action:?}"),
        });
    }
    table.insert((state_id, terminal.to_string()), action);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::Terminal;
    use Action::*;

    /// (4.55) from the Dragon Book 2e, section 4.7.2, p. 263.
    fn example_grammar() -> Grammar {
        Grammar::new(
            "s",
            vec![
                Terminal::new("C", "C", 0).unwrap(),
                Terminal::new("D", "D", 0).unwrap(),
            ],
            vec![],
            vec![],
            vec![
                Production::new("s", vec!["c", "c"]),
                Production::new("c", vec!["C", "c"]),
                Production::new("c", vec!["D"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn example_grammar_tables() {
        let grammar = example_grammar();
        let (action_table, goto_table) = tables(&grammar).unwrap();

        let c_to_d = Production::new("c", vec!["D"]);
        let c_to_cc = Production::new("c", vec!["C", "c"]);
        let s_to_cc = Production::new("s", vec!["c", "c"]);

        let expected_action_table: ActionTable = HashMap::from_iter(vec![
            ((0, "C".into()), Shift(3)),
            ((0, "D".into()), Shift(4)),
            ((1, "$END".into()), Accept),
            ((2, "C".into()), Shift(6)),
            ((2, "D".into()), Shift(7)),
            ((3, "C".into()), Shift(3)),
            ((3, "D".into()), Shift(4)),
            ((4, "C".into()), Reduce(c_to_d.clone())),
            ((4, "D".into()), Reduce(c_to_d.clone())),
            ((5, "$END".into()), Reduce(s_to_cc)),
            ((6, "C".into()), Shift(6)),
            ((6, "D".into()), Shift(7)),
            ((7, "$END".into()), Reduce(c_to_d)),
            ((8, "C".into()), Reduce(c_to_cc.clone())),
            ((8, "D".into()), Reduce(c_to_cc.clone())),
            ((9, "$END".into()), Reduce(c_to_cc)),
        ]);

        let expected_goto_table: GotoTable = HashMap::from_iter(vec![
            ((0, "s".into()), 1),
            ((0, "c".into()), 2),
            ((2, "c".into()), 5),
            ((3, "c".into()), 8),
            ((6, "c".into()), 9),
        ]);
        assert_eq!(action_table, expected_action_table);
        assert_eq!(goto_table, expected_goto_table);
    }

    #[test]
    fn left_recursion_terminates() {
        let grammar = Grammar::new(
            "start",
            vec![
                Terminal::new("NUMBER", r"[0-9]+", 1).unwrap(),
                Terminal::new("PLUS", r"\+", 0).unwrap(),
            ],
            vec![],
            vec![],
            vec![
                Production::new("start", vec!["sums"]),
                Production::new("sums", vec!["NUMBER"]),
                Production::new("sums", vec!["sums", "PLUS", "NUMBER"]),
            ],
        )
        .unwrap();
        let (action_table, _) = tables(&grammar).unwrap();
        assert!(matches!(
            action_table.get(&(0, "NUMBER".into())),
            Some(Shift(_))
        ));
    }

    #[test]
    fn epsilon_production() {
        // start -> A opt B; opt -> C | epsilon. B must be in the follow
        // lookaheads of the epsilon reduce.
        let grammar = Grammar::new(
            "start",
            vec![
                Terminal::new("A", "a", 0).unwrap(),
                Terminal::new("B", "b", 0).unwrap(),
                Terminal::new("C", "c", 0).unwrap(),
            ],
            vec![],
            vec![],
            vec![
                Production::new("start", vec!["A", "opt", "B"]),
                Production::new("opt", vec!["C"]),
                Production::epsilon("opt"),
            ],
        )
        .unwrap();
        let (action_table, _) = tables(&grammar).unwrap();
        let after_a = action_table
            .iter()
            .find_map(|((s, t), a)| {
                if *s == 0 && t == "A" {
                    if let Shift(n) = a { Some(*n) } else { None }
                } else {
                    None
                }
            })
            .unwrap();
        // After A we may either shift C or reduce the epsilon on seeing B.
        assert!(matches!(
            action_table.get(&(after_a, "C".into())),
            Some(Shift(_))
        ));
        assert!(matches!(
            action_table.get(&(after_a, "B".into())),
            Some(Reduce(p)) if p.is_epsilon()
        ));
    }

    #[test]
    fn conflicts_are_errors() {
        // Ambiguous: two identical unit productions via different paths.
        let grammar = Grammar::new(
            "start",
            vec![Terminal::new("A", "a", 0).unwrap()],
            vec![],
            vec![],
            vec![
                Production::new("start", vec!["x"]),
                Production::new("start", vec!["y"]),
                Production::new("x", vec!["A"]),
                Production::new("y", vec!["A"]),
            ],
        )
        .unwrap();
        assert!(matches!(
            tables(&grammar),
            Err(GrammarError::Conflict { .. })
        ));
    }
}
