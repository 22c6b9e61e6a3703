// src/store.rs
/*!
On-disk caching of built mask stores.

Building a store walks every vocabulary token from every automaton state,
which for a real model vocabulary takes a while; the result depends only on
the grammar, the vocabulary, and the build options, so it is written out
once and reloaded on later runs.

The format is a flat little-endian binary file. Only the two simulated
tables are persisted: the per-state union table and the indentation maps
are cheap to rebuild from what the file guarantees is the same grammar and
vocabulary. Automaton state ids are stable across runs because the same
pattern compiles to the same automaton.
*/

use crate::grammar::{Grammar, GrammarError};
use crate::mask::{FsmState, MaskMode, MaskStore, MaskStoreOptions};
use crate::parser::LrParser;
use crate::vocab::Vocabulary;
use log::warn;
use regex_automata::util::primitives::StateID;
use std::path::Path;
use thiserror::Error;

const MAGIC: &[u8; 4] = b"SGMS";
const VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not a mask store file")]
    BadMagic,
    #[error("unsupported mask store version {0}")]
    UnsupportedVersion(u32),
    #[error("content hash mismatch: expected {expected:#018x}, found {found:#018x}")]
    HashMismatch { expected: u64, found: u64 },
    #[error("header mismatch: {0}")]
    HeaderMismatch(String),
    #[error("corrupt mask store: {0}")]
    Corrupt(String),
}

/// A fingerprint of everything a store's contents depend on. A store saved
/// under one hash is only ever loaded under the same hash.
pub fn content_hash(
    grammar: &Grammar,
    tokenizer_id: &str,
    vocab_size: usize,
    options: &MaskStoreOptions,
) -> u64 {
    let mut h = Fnv1a::new();
    h.update(grammar.start_symbol.as_bytes());
    for t in &grammar.terminals {
        h.update(t.name.as_bytes());
        h.update(t.pattern.as_bytes());
        h.update(&t.priority.to_le_bytes());
    }
    for d in &grammar.declared_terminals {
        h.update(d.as_bytes());
    }
    let mut ignore: Vec<&String> = grammar.ignore.iter().collect();
    ignore.sort();
    for i in ignore {
        h.update(i.as_bytes());
    }
    for p in &grammar.productions {
        h.update(p.lhs.as_bytes());
        for sym in p.rhs.iter() {
            h.update(sym.as_bytes());
        }
    }
    let mut simplified: Vec<(&String, &String)> = options.simplifications.iter().collect();
    simplified.sort();
    for (name, pattern) in simplified {
        h.update(name.as_bytes());
        h.update(pattern.as_bytes());
    }
    h.update(tokenizer_id.as_bytes());
    h.update(&(vocab_size as u64).to_le_bytes());
    h.update(&[mode_byte(options.mode), options.indentation as u8]);
    h.finish()
}

impl MaskStore {
    /// Serialize the store to `path`, tagged with `hash`. The byte stream
    /// is deterministic for a given store.
    pub fn save(&self, path: &Path, hash: u64) -> Result<(), StoreError> {
        let words_per_mask = self.vocab_size().div_ceil(64);
        let mut out: Vec<u8> = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&hash.to_le_bytes());
        out.push(mode_byte(self.mode()));
        out.push(self.indentation as u8);
        out.extend_from_slice(&(self.vocab_size() as u32).to_le_bytes());

        let mut table: Vec<(&(FsmState, u32), &crate::bitmask::TokenMask)> =
            self.lookup.table.iter().collect();
        table.sort_by_key(|((st, next), _)| (st.terminal, st.state.as_usize(), *next));
        out.extend_from_slice(&(table.len() as u32).to_le_bytes());
        for ((st, next), mask) in table {
            debug_assert_eq!(mask.words().len(), words_per_mask);
            out.extend_from_slice(&st.terminal.to_le_bytes());
            out.extend_from_slice(&(st.state.as_usize() as u32).to_le_bytes());
            out.extend_from_slice(&next.to_le_bytes());
            for word in mask.words() {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }

        let mut exact: Vec<(&FsmState, &crate::bitmask::TokenMask)> =
            self.lookup.exact.iter().collect();
        exact.sort_by_key(|(st, _)| (st.terminal, st.state.as_usize()));
        out.extend_from_slice(&(exact.len() as u32).to_le_bytes());
        for (st, mask) in exact {
            out.extend_from_slice(&st.terminal.to_le_bytes());
            out.extend_from_slice(&(st.state.as_usize() as u32).to_le_bytes());
            for word in mask.words() {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }

        std::fs::write(path, out)?;
        Ok(())
    }

    /// Load a store saved by `save`, rebuilding everything not persisted
    /// (automata, indentation maps, per-state unions) from the grammar and
    /// vocabulary, which the content hash pins to the saved ones.
    pub fn load(
        path: &Path,
        grammar: &Grammar,
        vocab: &Vocabulary,
        options: &MaskStoreOptions,
        hash: u64,
    ) -> Result<MaskStore, StoreError> {
        let data = std::fs::read(path)?;
        let mut r = Reader::new(&data);

        if r.bytes(4)? != MAGIC {
            return Err(StoreError::BadMagic);
        }
        let version = r.u32()?;
        if version != VERSION {
            return Err(StoreError::UnsupportedVersion(version));
        }
        let found = r.u64()?;
        if found != hash {
            return Err(StoreError::HashMismatch {
                expected: hash,
                found,
            });
        }
        let mode = r.u8()?;
        if mode != mode_byte(options.mode) {
            return Err(StoreError::HeaderMismatch("mask mode".into()));
        }
        let indentation = r.u8()? != 0;
        if indentation != options.indentation {
            return Err(StoreError::HeaderMismatch("indentation".into()));
        }
        let vocab_size = r.u32()? as usize;
        if vocab_size != vocab.len() {
            return Err(StoreError::HeaderMismatch(format!(
                "vocabulary size {vocab_size} != {}",
                vocab.len()
            )));
        }

        let mut store = MaskStore::skeleton(grammar, vocab, options)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let words_per_mask = vocab_size.div_ceil(64);

        let table_len = r.u32()?;
        for _ in 0..table_len {
            let st = r.fsm_state(&store)?;
            let next = r.u32()?;
            let mask = r.mask(vocab_size, words_per_mask)?;
            if let Some(union) = store.lookup.overapprox.get_mut(&st) {
                union.union_with(&mask);
            }
            store.lookup.table.insert((st, next), mask);
        }

        let exact_len = r.u32()?;
        for _ in 0..exact_len {
            let st = r.fsm_state(&store)?;
            let mask = r.mask(vocab_size, words_per_mask)?;
            store.lookup.exact.insert(st, mask);
        }

        if !r.at_end() {
            return Err(StoreError::Corrupt("trailing bytes".into()));
        }
        Ok(store)
    }

    /// Load the store cached at `path`, or build it from scratch and cache
    /// it. A cache that fails to load for any reason is discarded with a
    /// warning; a cache that fails to write is not fatal either.
    pub fn load_or_build(
        path: &Path,
        grammar: &Grammar,
        vocab: &Vocabulary,
        tokenizer_id: &str,
        parser: Option<&LrParser>,
        options: &MaskStoreOptions,
    ) -> Result<MaskStore, GrammarError> {
        let hash = content_hash(grammar, tokenizer_id, vocab.len(), options);
        if path.exists() {
            match MaskStore::load(path, grammar, vocab, options, hash) {
                Ok(store) => return Ok(store),
                Err(e) => warn!("discarding mask store cache at {}: {e}", path.display()),
            }
        }
        let store = MaskStore::build(grammar, vocab, parser, options)?;
        if let Err(e) = store.save(path, hash) {
            warn!("failed to cache mask store at {}: {e}", path.display());
        }
        Ok(store)
    }
}

fn mode_byte(mode: MaskMode) -> u8 {
    match mode {
        MaskMode::Overapproximate => 0,
        MaskMode::Strict => 1,
    }
}

/// 64-bit FNV-1a. Stable across runs and platforms, unlike the std hasher.
struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Fnv1a(0xcbf29ce484222325)
    }

    fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
        // Separate the fields so concatenations can't collide.
        self.0 ^= 0xff;
        self.0 = self.0.wrapping_mul(0x100000001b3);
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| StoreError::Corrupt("truncated".into()))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, StoreError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, StoreError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, StoreError> {
        let b = self.bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn fsm_state(&mut self, store: &MaskStore) -> Result<FsmState, StoreError> {
        let terminal = self.u32()?;
        let raw = self.u32()?;
        let state = StateID::new(raw as usize)
            .map_err(|_| StoreError::Corrupt(format!("bad state id {raw}")))?;
        let st = FsmState { terminal, state };
        // The state must exist in the freshly compiled automata.
        if !store.lookup.overapprox.contains_key(&st) {
            return Err(StoreError::Corrupt(format!(
                "unknown automaton state {raw} for terminal {terminal}"
            )));
        }
        Ok(st)
    }

    fn mask(
        &mut self,
        vocab_size: usize,
        words_per_mask: usize,
    ) -> Result<crate::bitmask::TokenMask, StoreError> {
        let raw = self.bytes(words_per_mask * 8)?;
        let words: Vec<u64> = raw
            .chunks_exact(8)
            .map(|c| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(c);
                u64::from_le_bytes(buf)
            })
            .collect();
        crate::bitmask::TokenMask::from_words(vocab_size, words)
            .ok_or_else(|| StoreError::Corrupt("bad mask bits".into()))
    }

    fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

// Only the simulated tables are persisted, so that's what equality means
// for the round-trip tests.
#[cfg(test)]
fn tables_equal(a: &MaskStore, b: &MaskStore) -> bool {
    a.lookup.table == b.lookup.table && a.lookup.exact == b.lookup.exact
}
