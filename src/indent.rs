// src/indent.rs
/*!
Indentation handling for layout-sensitive languages, done as a post-lex pass.

The lexer knows nothing about indentation; its newline terminal swallows the
line break plus the following horizontal whitespace. This module watches
those newline tokens, keeps an indentation stack, and synthesizes indent and
dedent tokens into the stream. Everything language-specific lives in an
`IndentationPolicy`, so one engine serves any layout-sensitive grammar.
*/

use crate::token::Token;
use regex::bytes::Regex;
use std::sync::LazyLock;

/// Splits a newline token that swallowed a triple-quoted string into the
/// part before the string, the string itself, and the part after it.
static LONG_STRING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^(.*)('''.*?'''|""".*?""")(.*)$"#).expect("static pattern compiles")
});

/// Names and parameters that tie indentation handling to a grammar.
#[derive(Clone, Debug)]
pub struct IndentationPolicy {
    /// The newline terminal; its value is `\n` plus trailing whitespace.
    pub nl_type: String,
    /// The synthesized indent terminal.
    pub indent_type: String,
    /// The synthesized dedent terminal.
    pub dedent_type: String,
    /// The terminal a swallowed triple-quoted string is re-emitted as.
    pub long_string_type: String,
    /// Terminals that open a bracketed context where newlines don't count.
    pub open_paren_types: Vec<String>,
    /// Terminals that close a bracketed context.
    pub close_paren_types: Vec<String>,
    /// How many columns a tab is worth.
    pub tab_len: usize,
}

impl IndentationPolicy {
    /// The conventional Python setup.
    pub fn python() -> Self {
        IndentationPolicy {
            nl_type: "_NL".into(),
            indent_type: "_INDENT".into(),
            dedent_type: "_DEDENT".into(),
            long_string_type: "LONG_STRING".into(),
            open_paren_types: vec!["LPAR".into(), "LSQB".into(), "LBRACE".into()],
            close_paren_types: vec!["RPAR".into(), "RSQB".into(), "RBRACE".into()],
            tab_len: 4,
        }
    }

    /// The indentation width of a whitespace run.
    pub fn indent_width(&self, bytes: &[u8]) -> usize {
        let spaces = bytes.iter().filter(|&&b| b == b' ').count();
        let tabs = bytes.iter().filter(|&&b| b == b'\t').count();
        spaces + tabs * self.tab_len
    }

    /// Guess the tab width from a partially written program: the first
    /// indented line after a line ending in `:` reveals the unit. Tabs map
    /// to the default of four; otherwise the number of leading spaces is
    /// taken as the unit. Leaves the policy unchanged when the code has no
    /// indented block yet.
    pub fn with_detected_tab_len(mut self, code: &[u8]) -> Self {
        let mut after_colon = false;
        for line in code.split(|&b| b == b'\n') {
            if after_colon {
                let lead: Vec<u8> = line
                    .iter()
                    .copied()
                    .take_while(|&b| b == b' ' || b == b'\t')
                    .collect();
                if !lead.is_empty() {
                    if lead.contains(&b'\t') {
                        self.tab_len = 4;
                    } else {
                        self.tab_len = lead.len();
                    }
                    return self;
                }
            }
            let trimmed: &[u8] = {
                let mut t = line;
                while let Some((&last, rest)) = t.split_last() {
                    if last == b' ' || last == b'\t' || last == b'\r' {
                        t = rest;
                    } else {
                        break;
                    }
                }
                t
            };
            after_colon = trimmed.last() == Some(&b':');
        }
        self
    }
}

/// One pass of indent/dedent synthesis over a lexed token stream.
///
/// The indenter is rebuilt for every engine call: it re-derives its state
/// from the full token stream, so it carries nothing between calls.
pub struct Indenter {
    policy: IndentationPolicy,
    indent_level: Vec<usize>,
    paren_level: usize,
}

impl Indenter {
    pub fn new(policy: IndentationPolicy) -> Self {
        Indenter {
            policy,
            indent_level: vec![0],
            paren_level: 0,
        }
    }

    pub fn postlex(&mut self, tokens: Vec<Token>) -> Vec<Token> {
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            if token.terminal == self.policy.nl_type && !token.ignored {
                self.handle_nl(token, &mut out);
            } else {
                if self.policy.open_paren_types.contains(&token.terminal) {
                    self.paren_level += 1;
                } else if self.policy.close_paren_types.contains(&token.terminal) {
                    self.paren_level = self.paren_level.saturating_sub(1);
                }
                out.push(token);
            }
        }
        out
    }

    fn handle_nl(&mut self, token: Token, out: &mut Vec<Token>) {
        // Newlines inside brackets are not statement separators.
        if self.paren_level > 0 {
            return;
        }

        let value = token.value.clone();
        let measured: Vec<u8>;
        if let Some(caps) = LONG_STRING_RE.captures(&value) {
            // The newline terminal swallowed a triple-quoted string. Split
            // the string's leading indentation out of the newline token so
            // the indentation stack is not corrupted, and re-emit the string
            // under its own terminal.
            let head = caps.get(1).map_or(&b""[..], |m| m.as_bytes());
            let literal = caps.get(2).map_or(&b""[..], |m| m.as_bytes());
            let tail = caps.get(3).map_or(&b""[..], |m| m.as_bytes());

            let indent_str = last_line(head);
            let indent = self.policy.indent_width(indent_str);
            self.indent_level.push(indent);

            out.push(Token {
                value: head.into(),
                ..token.clone()
            });
            out.push(Token {
                value: indent_str.into(),
                terminal: self.policy.indent_type.clone(),
                ..token.clone()
            });
            out.push(Token {
                value: literal.into(),
                terminal: self.policy.long_string_type.clone(),
                ..token.clone()
            });

            if !tail.contains(&b'\n') {
                return;
            }
            measured = tail.to_vec();
        } else {
            measured = value.to_vec();
            out.push(token.clone());
        }

        let indent_str = last_line(&measured);
        let indent = self.policy.indent_width(indent_str);
        if indent > self.top() {
            self.indent_level.push(indent);
            out.push(Token {
                value: indent_str.into(),
                terminal: self.policy.indent_type.clone(),
                ..token.clone()
            });
        } else {
            while indent < self.top() {
                self.indent_level.pop();
                out.push(Token {
                    value: indent_str.into(),
                    terminal: self.policy.dedent_type.clone(),
                    ..token.clone()
                });
            }
        }
    }

    fn top(&self) -> usize {
        self.indent_level.last().copied().unwrap_or(0)
    }
}

/// The text after the last newline, or the whole input if there is none.
fn last_line(bytes: &[u8]) -> &[u8] {
    match bytes.iter().rposition(|&b| b == b'\n') {
        Some(i) => &bytes[i + 1..],
        None => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nl(value: &str) -> Token {
        Token::new(value.as_bytes(), "_NL", false, 0, value.len())
    }

    fn tok(value: &str, terminal: &str) -> Token {
        Token::new(value.as_bytes(), terminal, false, 0, value.len())
    }

    fn names(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.terminal.as_str()).collect()
    }

    #[test]
    fn indent_and_dedent_synthesis() {
        let mut indenter = Indenter::new(IndentationPolicy::python());
        let out = indenter.postlex(vec![
            tok("if", "IF"),
            tok("a", "NAME"),
            tok(":", "COLON"),
            nl("\n    "),
            tok("b", "NAME"),
            nl("\n"),
            tok("c", "NAME"),
        ]);
        assert_eq!(
            names(&out),
            vec!["IF", "NAME", "COLON", "_NL", "_INDENT", "NAME", "_NL", "_DEDENT", "NAME"]
        );
    }

    #[test]
    fn multi_level_dedent() {
        let mut indenter = Indenter::new(IndentationPolicy::python());
        let out = indenter.postlex(vec![
            tok("a", "NAME"),
            nl("\n\t"),
            tok("b", "NAME"),
            nl("\n\t\t"),
            tok("c", "NAME"),
            nl("\n"),
            tok("d", "NAME"),
        ]);
        assert_eq!(
            names(&out),
            vec![
                "NAME", "_NL", "_INDENT", "NAME", "_NL", "_INDENT", "NAME", "_NL", "_DEDENT",
                "_DEDENT", "NAME"
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_dropped() {
        let mut indenter = Indenter::new(IndentationPolicy::python());
        let out = indenter.postlex(vec![
            tok("f", "NAME"),
            tok("(", "LPAR"),
            nl("\n    "),
            tok("x", "NAME"),
            tok(")", "RPAR"),
        ]);
        assert_eq!(names(&out), vec!["NAME", "LPAR", "NAME", "RPAR"]);
    }

    #[test]
    fn equal_indent_is_neither() {
        let mut indenter = Indenter::new(IndentationPolicy::python());
        let out = indenter.postlex(vec![tok("a", "NAME"), nl("\n"), tok("b", "NAME")]);
        assert_eq!(names(&out), vec!["NAME", "_NL", "NAME"]);
    }

    #[test]
    fn swallowed_long_string_is_split_out() {
        let mut indenter = Indenter::new(IndentationPolicy::python());
        let out = indenter.postlex(vec![nl("\n    '''doc'''")]);
        assert_eq!(names(&out), vec!["_NL", "_INDENT", "LONG_STRING"]);
        assert_eq!(&*out[1].value, b"    ");
        assert_eq!(&*out[2].value, b"'''doc'''");
    }

    #[test]
    fn tab_len_detection() {
        let policy = IndentationPolicy::python().with_detected_tab_len(b"def f():\n  x = 1\n");
        assert_eq!(policy.tab_len, 2);
        let policy = IndentationPolicy::python().with_detected_tab_len(b"def f():\n\tx = 1\n");
        assert_eq!(policy.tab_len, 4);
        let policy = IndentationPolicy::python().with_detected_tab_len(b"x = 1\n");
        assert_eq!(policy.tab_len, 4);
    }
}
