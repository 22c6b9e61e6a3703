// src/lib.rs
//! Syngram constrains language-model generation to a context-free grammar.
//!
//! The pipeline has two halves. Offline, [`mask::MaskStore::build`] walks
//! every vocabulary token from every state of every terminal's byte-level
//! automaton and records, per (automaton state, plausible next terminal),
//! the mask of tokens that fit; [`store`] caches the result on disk. At
//! decode time, [`engine::IncrementalParser`] keeps an incremental LR(1)
//! parse of the text generated so far and reports which terminals may come
//! next and what unlexed remainder is pending; [`mask::MaskStore::get_accept_mask`]
//! turns that into a vocabulary mask to apply to the model's logits.
//!
//! Indentation-sensitive languages are handled by a postlexer
//! ([`indent::Indenter`]) that synthesizes indent and dedent tokens, plus
//! indentation constraints carried through to the mask.

pub mod bitmask;
pub mod dfa;
pub mod engine;
pub mod grammar;
pub mod indent;
pub mod lexer;
pub mod mask;
pub mod parser;
pub mod production;
pub mod result;
pub mod store;
pub mod table;
pub mod terminal;
pub mod token;
pub mod vocab;

pub use bitmask::TokenMask;
pub use engine::IncrementalParser;
pub use grammar::{Grammar, GrammarError};
pub use indent::IndentationPolicy;
pub use mask::{MaskMode, MaskStore, MaskStoreOptions};
pub use parser::LrParser;
pub use production::Production;
pub use result::{IndentationConstraint, ParseResult, RemainderState};
pub use store::{StoreError, content_hash};
pub use terminal::{END_TERMINAL, Terminal};
pub use vocab::{Vocabulary, restore_bytes};
