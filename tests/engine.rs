// tests/engine.rs
//! End-to-end tests of the incremental parser over whole partial programs,
//! including the layout-sensitive path.

use syngram::engine::IncrementalParser;
use syngram::grammar::Grammar;
use syngram::indent::IndentationPolicy;
use syngram::production::Production;
use syngram::result::{IndentationConstraint, RemainderState};
use syngram::terminal::Terminal;

fn calc_grammar() -> Grammar {
    Grammar::new(
        "start",
        vec![
            Terminal::new("NUMBER", r"[0-9]+", 1).unwrap(),
            Terminal::new("PLUS", r"\+", 0).unwrap(),
            Terminal::new("WS", r"[ ]+", 0).unwrap(),
        ],
        vec![],
        vec!["WS".into()],
        vec![
            Production::new("start", vec!["sums"]),
            Production::new("sums", vec!["NUMBER"]),
            Production::new("sums", vec!["sums", "PLUS", "NUMBER"]),
        ],
    )
    .unwrap()
}

fn assign_grammar() -> Grammar {
    Grammar::new(
        "start",
        vec![
            Terminal::new("NAME", r"[a-z_]+", 0).unwrap(),
            Terminal::new("EQUALS", r"=", 0).unwrap(),
            Terminal::new("STRING", r"'[^']*'", 1).unwrap(),
            Terminal::new("WS", r"[ ]+", 0).unwrap(),
        ],
        vec![],
        vec!["WS".into()],
        vec![Production::new("start", vec!["NAME", "EQUALS", "STRING"])],
    )
    .unwrap()
}

fn block_grammar() -> Grammar {
    Grammar::new(
        "start",
        vec![
            Terminal::new("IF", r"if", 1).unwrap(),
            Terminal::new("NAME", r"[a-z_]+", 0).unwrap(),
            Terminal::new("COLON", r":", 0).unwrap(),
            Terminal::new("_NL", r"(\r?\n[ \t]*)+", 0).unwrap(),
            Terminal::new("WS", r"[ \t]+", 0).unwrap(),
        ],
        vec!["_INDENT".into(), "_DEDENT".into()],
        vec!["WS".into()],
        vec![
            Production::new("start", vec!["stmts"]),
            Production::new("stmts", vec!["stmt"]),
            Production::new("stmts", vec!["stmts", "stmt"]),
            Production::new("stmt", vec!["NAME", "_NL"]),
            Production::new(
                "stmt",
                vec!["IF", "NAME", "COLON", "_NL", "_INDENT", "stmts", "_DEDENT"],
            ),
        ],
    )
    .unwrap()
}

#[test]
fn chunked_parsing_matches_one_shot() {
    let grammar = calc_grammar();
    let code = b"10 + 22 + 333";
    for chunk in 1..=4 {
        let mut engine = IncrementalParser::from_grammar(&grammar, None).unwrap();
        let mut result = engine.get_acceptable_next_terminals(b"");
        let mut end = 0;
        while end < code.len() {
            end = (end + chunk).min(code.len());
            result = engine.get_acceptable_next_terminals(&code[..end]);
        }

        let mut fresh = IncrementalParser::from_grammar(&grammar, None).unwrap();
        let expected = fresh.get_acceptable_next_terminals(code);
        assert_eq!(result.remainder, expected.remainder, "chunk size {chunk}");
        assert_eq!(result.remainder_state, expected.remainder_state);
        assert_eq!(result.accept_sequences, expected.accept_sequences);
    }
}

#[test]
fn rewritten_suffix_falls_back_cleanly() {
    let grammar = calc_grammar();
    let mut engine = IncrementalParser::from_grammar(&grammar, None).unwrap();
    engine.get_acceptable_next_terminals(b"1 + 2 + 3");
    // The continuation diverges from the previous call's tokens.
    let result = engine.get_acceptable_next_terminals(b"9 + 8");

    let mut fresh = IncrementalParser::from_grammar(&grammar, None).unwrap();
    let expected = fresh.get_acceptable_next_terminals(b"9 + 8");
    assert_eq!(result.remainder, expected.remainder);
    assert_eq!(result.accept_sequences, expected.accept_sequences);
}

#[test]
fn unterminated_string_is_an_incomplete_remainder() {
    let grammar = assign_grammar();
    let mut engine = IncrementalParser::from_grammar(&grammar, None).unwrap();
    let result = engine.get_acceptable_next_terminals(b"x = 'Hello");

    assert_eq!(result.remainder_state, RemainderState::Incomplete);
    assert_eq!(result.remainder, b"'Hello");
    assert!(result.accepts_first("STRING"));
    assert!(!result.accepts_first("NAME"));
}

#[test]
fn empty_string_may_still_become_a_docstring() {
    // `""` is a complete short string, but two more quotes would reopen it
    // as a triple-quoted one; the remainder must stay re-lexable.
    let grammar = Grammar::new(
        "start",
        vec![
            Terminal::new("NAME", r"[a-z_]+", 0).unwrap(),
            Terminal::new("EQUALS", r"=", 0).unwrap(),
            Terminal::new("STRING", r#""[^"]*""#, 1).unwrap(),
            Terminal::new("LONG_STRING", r#""""[^"]*""""#, 2).unwrap(),
            Terminal::new("WS", r"[ ]+", 0).unwrap(),
        ],
        vec![],
        vec!["WS".into()],
        vec![
            Production::new("start", vec!["NAME", "EQUALS", "value"]),
            Production::new("value", vec!["STRING"]),
            Production::new("value", vec!["LONG_STRING"]),
        ],
    )
    .unwrap();
    let mut engine = IncrementalParser::from_grammar(&grammar, None).unwrap();
    let result = engine.get_acceptable_next_terminals(b"x = \"\"");

    assert_eq!(result.remainder_state, RemainderState::MaybeComplete);
    assert_eq!(result.remainder, b"\"\"");
    assert!(result.accepts_first("LONG_STRING"));
    assert!(result
        .accept_sequences
        .contains(&vec!["STRING".to_string(), "$END".to_string()]));
}

#[test]
fn block_opening_demands_deeper_indent() {
    let grammar = block_grammar();
    let mut engine =
        IncrementalParser::from_grammar(&grammar, Some(IndentationPolicy::python())).unwrap();
    let result = engine.get_acceptable_next_terminals(b"if a:\n");

    assert_eq!(result.remainder_state, RemainderState::MaybeComplete);
    assert_eq!(
        result.next_ac_indents,
        Some(IndentationConstraint::GreaterThan(0))
    );
    // The newline token itself can always grow more whitespace.
    assert!(result.accepts_first("_NL"));
}

#[test]
fn partial_indent_relaxes_the_bound() {
    let grammar = block_grammar();
    let mut engine =
        IncrementalParser::from_grammar(&grammar, Some(IndentationPolicy::python())).unwrap();
    let result = engine.get_acceptable_next_terminals(b"if a:\n\t");

    // One level is already open; staying at it or going deeper are both fine.
    assert_eq!(
        result.next_ac_indents,
        Some(IndentationConstraint::GreaterThan(-1))
    );
}

#[test]
fn body_line_accepts_sibling_or_dedent_indents() {
    let grammar = block_grammar();
    let mut engine =
        IncrementalParser::from_grammar(&grammar, Some(IndentationPolicy::python())).unwrap();
    let result = engine.get_acceptable_next_terminals(b"if a:\n\tb\n");

    assert_eq!(
        result.next_ac_indents,
        Some(IndentationConstraint::Accept(vec![0, 4]))
    );
}

#[test]
fn dedent_fires_when_real_code_follows() {
    let grammar = block_grammar();
    let mut engine =
        IncrementalParser::from_grammar(&grammar, Some(IndentationPolicy::python())).unwrap();
    let result = engine.get_acceptable_next_terminals(b"if a:\n\tb\nc");

    assert_eq!(result.remainder_state, RemainderState::MaybeComplete);
    assert_eq!(result.remainder, b"c");
    // "c" parsed as a top-level statement after the synthesized dedent.
    assert!(result
        .accept_sequences
        .contains(&vec!["NAME".to_string(), "_NL".to_string()]));
}

#[test]
fn nested_blocks_dedent_incrementally() {
    let grammar = block_grammar();
    let mut engine =
        IncrementalParser::from_grammar(&grammar, Some(IndentationPolicy::python())).unwrap();
    engine.get_acceptable_next_terminals(b"if a:\n\tif b:\n\t\tc\n");
    let result = engine.get_acceptable_next_terminals(b"if a:\n\tif b:\n\t\tc\n\td\ne");

    let mut fresh =
        IncrementalParser::from_grammar(&grammar, Some(IndentationPolicy::python())).unwrap();
    let expected = fresh.get_acceptable_next_terminals(b"if a:\n\tif b:\n\t\tc\n\td\ne");
    assert_eq!(result.remainder, b"e");
    assert_eq!(result.accept_sequences, expected.accept_sequences);
}
