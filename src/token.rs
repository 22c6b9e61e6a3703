use bstr::BStr;
use std::fmt;
use std::sync::Arc;

/// A lexical token, what the lexer breaks the input into.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    /// The content of the token.
    pub value: Arc<[u8]>,
    /// The name of the terminal this token matched. Synthesized tokens
    /// (indent, dedent) carry the names from the indentation policy.
    pub terminal: String,
    /// Whether this token belongs to an ignored terminal. Ignored tokens are
    /// kept in the stream so byte positions stay accurate, but are never fed
    /// to the parser.
    pub ignored: bool,
    /// Where in the input the token begins.
    pub start_pos: usize,
    /// Where in the input the token ends.
    pub end_pos: usize,
}

impl Token {
    pub fn new(value: &[u8], terminal: &str, ignored: bool, start_pos: usize, end_pos: usize) -> Self {
        Token {
            value: value.into(),
            terminal: terminal.into(),
            ignored,
            start_pos,
            end_pos,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &BStr::new(&self.value))
            .field("terminal", &self.terminal)
            .field("ignored", &self.ignored)
            .field("span", &(self.start_pos..self.end_pos))
            .finish()
    }
}
