//! Delay pattern bookkeeping for multi-codebook generation.
//!
//! The decoder emits all codebooks in parallel, but causality across
//! codebooks is kept by delaying codebook `k` by `k` steps. This module
//! tracks the per-codebook token history, produces the delayed view fed back
//! into the decoder, and recovers the de-delayed diagonal that forms the
//! actual output frames. Continuation prompts are pushed through the same
//! structure so a chunk's prompt prefix and its new frames share one
//! consistent delay state.

/// Delay pattern state for N codebooks.
#[derive(Debug)]
pub struct DelayPatternMaskIds<const N: usize> {
    batches: [Vec<i64>; N],
}

impl<const N: usize> Default for DelayPatternMaskIds<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DelayPatternMaskIds<N> {
    /// Creates a new empty delay pattern state.
    pub fn new() -> Self {
        assert!(N > 0, "N needs to be greater than 0");
        Self {
            batches: [(); N].map(|()| vec![]),
        }
    }

    /// Pushes one token per codebook.
    ///
    /// # Panics
    ///
    /// Panics if the iterator does not yield exactly N token IDs.
    pub fn push(&mut self, token_ids: impl IntoIterator<Item = i64>) {
        let mut i = 0;
        for token_id in token_ids.into_iter() {
            assert!(i < N, "Expected exactly {N} token_ids");
            self.batches[i].push(token_id);
            i += 1;
        }
        assert_eq!(i, N, "Expected exactly {N} token_ids");
    }

    /// Returns the most recent token per codebook with the delay applied:
    /// codebooks that are still inside their delay window yield the pad
    /// token.
    ///
    /// ```text
    ///   0 1 2 3 4 5 6 7 8 9 10
    /// 0 x x x x x x x x x x ...
    /// 1 P x x x x x x x x x ...
    /// 2 P P x x x x x x x x ...
    /// 3 P P P x x x x x x x ...
    /// ```
    pub fn last_delayed_masked(&self, pad_token_id: i64) -> [i64; N] {
        let seq_len = self.batches[0].len();
        let mut result = [0; N];
        for (i, item) in result.iter_mut().enumerate() {
            if (seq_len as i64 - i as i64) <= 0 {
                *item = pad_token_id
            } else {
                *item = *self.batches[i].last().expect("There are no input_ids");
            }
        }
        result
    }

    /// Returns the newest complete de-delayed diagonal, once N steps have
    /// accumulated:
    ///
    /// ```text
    ///   0 1 2 3 4 5 6 7 8 9
    /// 0 x x x x x x x P P P
    /// 1 P x x x x x x x P P
    /// 2 P P x x x x x x x P
    /// 3 P P P x x x x x x x
    /// ```
    pub fn last_de_delayed(&self) -> Option<[i64; N]> {
        if self.batches[0].len() < N {
            return None;
        }
        let mut result = [0; N];
        for (i, item) in result.iter_mut().enumerate() {
            *item = self.batches[i][self.batches[i].len() - N + i]
        }
        Some(result)
    }

    /// Returns the number of steps pushed so far.
    pub fn len(&self) -> usize {
        self.batches[0].len()
    }

    /// Returns true if no tokens have been added yet.
    pub fn is_empty(&self) -> bool {
        self.batches[0].is_empty()
    }
}
