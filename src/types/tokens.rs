//! Discrete audio token sequences.
//!
//! A [`TokenSequence`] is the unit of exchange between the decoder, the
//! windowed generation controller, and the audio codec: an ordered tensor of
//! shape `[batch, codebooks, time]` at the decoder's token frame rate. The
//! controller only ever slices and concatenates along the time axis, and
//! concatenation must preserve codebook alignment across chunk boundaries.

use ndarray::{concatenate, s, Array3, Axis};

use crate::error::{EngineError, Result};

/// An ordered tensor of discrete audio tokens, shaped `[batch, codebooks, time]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSequence {
    data: Array3<i64>,
}

impl TokenSequence {
    /// Wraps a raw `[batch, codebooks, time]` tensor.
    pub fn new(data: Array3<i64>) -> Self {
        Self { data }
    }

    /// Builds a single-batch sequence from per-step codebook frames.
    ///
    /// This is the assembly path used by the decoder, which produces one
    /// `[i64; K]` frame per autoregressive step.
    pub fn from_codebook_frames<const K: usize>(frames: &[[i64; K]]) -> Self {
        let time = frames.len();
        let mut data = Array3::<i64>::zeros((1, K, time));
        for (t, frame) in frames.iter().enumerate() {
            for (k, token) in frame.iter().enumerate() {
                data[[0, k, t]] = *token;
            }
        }
        Self { data }
    }

    /// Returns the underlying tensor.
    pub fn as_array(&self) -> &Array3<i64> {
        &self.data
    }

    /// Consumes self, returning the underlying tensor.
    pub fn into_array(self) -> Array3<i64> {
        self.data
    }

    /// Batch size.
    pub fn batch(&self) -> usize {
        self.data.dim().0
    }

    /// Number of codebooks.
    pub fn codebooks(&self) -> usize {
        self.data.dim().1
    }

    /// Length along the time axis.
    pub fn time_len(&self) -> usize {
        self.data.dim().2
    }

    /// True if no token frames are held.
    pub fn is_empty(&self) -> bool {
        self.time_len() == 0
    }

    /// Returns the suffix starting at time index `from`.
    ///
    /// An out-of-range `from` yields an empty sequence rather than panicking,
    /// matching the semantics of advancing a continuation seed past the end
    /// of a short final chunk.
    pub fn suffix(&self, from: usize) -> Self {
        let from = from.min(self.time_len());
        Self {
            data: self.data.slice(s![.., .., from..]).to_owned(),
        }
    }

    /// Returns the first `n` time steps (or everything, if shorter).
    pub fn first(&self, n: usize) -> Self {
        let n = n.min(self.time_len());
        Self {
            data: self.data.slice(s![.., .., ..n]).to_owned(),
        }
    }

    /// Concatenates sequences along the time axis.
    ///
    /// All parts must agree on batch size and codebook count; anything else
    /// would silently misalign codebooks across a chunk boundary.
    pub fn concat_time(parts: &[&TokenSequence]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| EngineError::shape_mismatch("cannot concatenate zero token chunks"))?;

        for part in parts {
            if part.batch() != first.batch() || part.codebooks() != first.codebooks() {
                return Err(EngineError::shape_mismatch(format!(
                    "token chunk [{}x{}] does not align with [{}x{}]",
                    part.batch(),
                    part.codebooks(),
                    first.batch(),
                    first.codebooks()
                )));
            }
        }

        let views: Vec<_> = parts.iter().map(|p| p.data.view()).collect();
        let data = concatenate(Axis(2), &views)
            .map_err(|e| EngineError::shape_mismatch(format!("token concat failed: {}", e)))?;
        Ok(Self { data })
    }

    /// Iterates batch-0 token frames as `[codebooks]`-sized vectors.
    ///
    /// This is the layout the audio codec consumes.
    pub fn codebook_frames(&self) -> Vec<Vec<i64>> {
        let (_, k, t) = self.data.dim();
        (0..t)
            .map(|step| (0..k).map(|cb| self.data[[0, cb, step]]).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(tokens: &[i64]) -> TokenSequence {
        // One batch, two codebooks, with the second codebook offset by 100
        // so misalignment would be visible.
        let t = tokens.len();
        let mut data = Array3::<i64>::zeros((1, 2, t));
        for (i, tok) in tokens.iter().enumerate() {
            data[[0, 0, i]] = *tok;
            data[[0, 1, i]] = *tok + 100;
        }
        TokenSequence::new(data)
    }

    #[test]
    fn from_codebook_frames_layout() {
        let s = TokenSequence::from_codebook_frames(&[[1i64, 5], [2, 6], [3, 7]]);
        assert_eq!(s.batch(), 1);
        assert_eq!(s.codebooks(), 2);
        assert_eq!(s.time_len(), 3);
        assert_eq!(s.as_array()[[0, 0, 0]], 1);
        assert_eq!(s.as_array()[[0, 1, 2]], 7);
    }

    #[test]
    fn suffix_advances_time_axis() {
        let s = seq(&[1, 2, 3, 4, 5]);
        let tail = s.suffix(3);
        assert_eq!(tail.time_len(), 2);
        assert_eq!(tail.as_array()[[0, 0, 0]], 4);
        assert_eq!(tail.as_array()[[0, 1, 0]], 104);
    }

    #[test]
    fn suffix_past_end_is_empty() {
        let s = seq(&[1, 2, 3]);
        assert!(s.suffix(3).is_empty());
        assert!(s.suffix(10).is_empty());
    }

    #[test]
    fn first_clamps() {
        let s = seq(&[1, 2, 3]);
        assert_eq!(s.first(2).time_len(), 2);
        assert_eq!(s.first(10).time_len(), 3);
    }

    #[test]
    fn concat_preserves_codebook_alignment() {
        let a = seq(&[1, 2]);
        let b = seq(&[3, 4, 5]);
        let joined = TokenSequence::concat_time(&[&a, &b]).unwrap();
        assert_eq!(joined.time_len(), 5);
        assert_eq!(joined.as_array()[[0, 0, 2]], 3);
        assert_eq!(joined.as_array()[[0, 1, 2]], 103);
    }

    #[test]
    fn concat_rejects_codebook_mismatch() {
        let a = seq(&[1, 2]);
        let b = TokenSequence::from_codebook_frames(&[[1i64, 2, 3]]);
        assert!(TokenSequence::concat_time(&[&a, &b]).is_err());
    }

    #[test]
    fn codebook_frames_round_trip() {
        let s = TokenSequence::from_codebook_frames(&[[1i64, 5], [2, 6]]);
        let frames = s.codebook_frames();
        assert_eq!(frames, vec![vec![1, 5], vec![2, 6]]);
    }
}
