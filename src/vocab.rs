// src/vocab.rs
/*!
The model vocabulary at the byte level.

Language models generally use byte-level vocabularies, but Huggingface
distributes these as Unicode characters according to a mapping between bytes
and code points. To constrain at the level of bytes we convert those
characters back into the bytes they stand for.
*/

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Converts characters back to bytes.
/// See <https://github.com/openai/gpt-2/blob/master/src/encoder.py#L9>
static CHAR_BYTES_MAP: LazyLock<HashMap<char, u8>> = LazyLock::new(|| {
    let mut bs: Vec<u8> = vec![];
    bs.extend(b'!'..=b'~');
    bs.extend(0xA1..=0xACu8);
    bs.extend(0xAE..=0xFFu8);

    let mut cs: Vec<u32> = bs.iter().map(|&b| b as u32).collect();
    let mut n = 0;
    for b in 0..=255u8 {
        if !bs.contains(&b) {
            bs.push(b);
            cs.push(256 + n);
            n += 1;
        }
    }

    // All values in cs are below 512, well inside the valid scalar range.
    bs.into_iter()
        .zip(cs)
        .filter_map(|(byte, code)| char::from_u32(code).map(|c| (c, byte)))
        .collect()
});

/// Convert a readable vocabulary entry back to the bytes it represents.
/// Characters outside the GPT-2 table pass through as their UTF-8 bytes.
pub fn restore_bytes(input: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    for c in input.chars() {
        match CHAR_BYTES_MAP.get(&c) {
            Some(&byte) => out.push(byte),
            None => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out
}

/// An ordered byte-level vocabulary plus its special token ids (end of
/// sequence and friends). Token id i is `tokens()[i]`.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    tokens: Vec<Vec<u8>>,
    special_ids: Vec<u32>,
    special_set: HashSet<u32>,
}

impl Vocabulary {
    pub fn new(tokens: Vec<Vec<u8>>, special_ids: Vec<u32>) -> Self {
        let special_set = special_ids.iter().copied().collect();
        Vocabulary {
            tokens,
            special_ids,
            special_set,
        }
    }

    /// Build from readable (character-mapped) token strings.
    pub fn from_readable(tokens: &[String], special_ids: Vec<u32>) -> Self {
        Vocabulary::new(
            tokens.iter().map(|t| restore_bytes(t)).collect(),
            special_ids,
        )
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Vec<u8>] {
        &self.tokens
    }

    pub fn token(&self, id: u32) -> Option<&[u8]> {
        self.tokens.get(id as usize).map(|t| t.as_slice())
    }

    pub fn special_ids(&self) -> &[u32] {
        &self.special_ids
    }

    pub fn is_special(&self, id: u32) -> bool {
        self.special_set.contains(&id)
    }
}
