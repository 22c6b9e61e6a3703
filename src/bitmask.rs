// src/bitmask.rs
//! A fixed-width bit vector over vocabulary token ids, packed into u64
//! words. Unions and intersections are word-wise, which is what makes mask
//! lookups cheap at decode time.

/// One boolean per vocabulary token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenMask {
    len: usize,
    words: Vec<u64>,
}

impl TokenMask {
    pub fn zeros(len: usize) -> Self {
        TokenMask {
            len,
            words: vec![0; len.div_ceil(64)],
        }
    }

    pub fn full(len: usize) -> Self {
        let mut mask = TokenMask {
            len,
            words: vec![u64::MAX; len.div_ceil(64)],
        };
        // Keep the unused high bits of the last word clear so equality and
        // popcounts stay meaningful.
        let tail = len % 64;
        if tail != 0 {
            if let Some(last) = mask.words.last_mut() {
                *last = (1u64 << tail) - 1;
            }
        }
        mask
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set(&mut self, idx: usize) {
        debug_assert!(idx < self.len);
        self.words[idx / 64] |= 1u64 << (idx % 64);
    }

    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        self.words[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    pub fn union_with(&mut self, other: &TokenMask) {
        debug_assert_eq!(self.len, other.len);
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w |= o;
        }
    }

    pub fn intersect_with(&mut self, other: &TokenMask) {
        debug_assert_eq!(self.len, other.len);
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w &= o;
        }
    }

    /// Whether any token is allowed.
    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// The ids of all allowed tokens, ascending.
    pub fn ones(&self) -> Vec<usize> {
        (0..self.len).filter(|&i| self.get(i)).collect()
    }

    pub fn is_subset_of(&self, other: &TokenMask) -> bool {
        debug_assert_eq!(self.len, other.len);
        self.words
            .iter()
            .zip(&other.words)
            .all(|(w, o)| w & !o == 0)
    }

    pub(crate) fn words(&self) -> &[u64] {
        &self.words
    }

    pub(crate) fn from_words(len: usize, words: Vec<u64>) -> Option<TokenMask> {
        if words.len() != len.div_ceil(64) {
            return None;
        }
        let tail = len % 64;
        if tail != 0 {
            if let Some(&last) = words.last() {
                if last & !((1u64 << tail) - 1) != 0 {
                    return None;
                }
            }
        }
        Some(TokenMask { len, words })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_count() {
        let mut mask = TokenMask::zeros(100);
        assert!(!mask.any());
        mask.set(0);
        mask.set(63);
        mask.set(64);
        mask.set(99);
        assert!(mask.get(0) && mask.get(63) && mask.get(64) && mask.get(99));
        assert!(!mask.get(1));
        assert_eq!(mask.count(), 4);
        assert_eq!(mask.ones(), vec![0, 63, 64, 99]);
    }

    #[test]
    fn full_clears_tail_bits() {
        let mask = TokenMask::full(70);
        assert_eq!(mask.count(), 70);
        assert_eq!(mask, {
            let mut m = TokenMask::zeros(70);
            for i in 0..70 {
                m.set(i);
            }
            m
        });
    }

    #[test]
    fn union_and_intersection() {
        let mut a = TokenMask::zeros(10);
        a.set(1);
        a.set(2);
        let mut b = TokenMask::zeros(10);
        b.set(2);
        b.set(3);
        let mut union = a.clone();
        union.union_with(&b);
        assert_eq!(union.ones(), vec![1, 2, 3]);
        let mut inter = a.clone();
        inter.intersect_with(&b);
        assert_eq!(inter.ones(), vec![2]);
        assert!(inter.is_subset_of(&a));
        assert!(inter.is_subset_of(&b));
        assert!(!a.is_subset_of(&b));
    }

    #[test]
    fn word_round_trip() {
        let mut mask = TokenMask::zeros(70);
        mask.set(69);
        let rebuilt = TokenMask::from_words(70, mask.words().to_vec()).unwrap();
        assert_eq!(rebuilt, mask);
        // A stray bit beyond the length is rejected.
        assert!(TokenMask::from_words(70, vec![0, u64::MAX]).is_none());
    }
}
