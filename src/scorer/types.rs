use crate::consts::WORST_SCORE;

/// One of the best-scoring densities of a codebook for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopNEntry {
    /// Density (codeword) index within the codebook.
    pub cw: u32,
    /// Log-likelihood in unshifted log units. Higher is closer.
    pub score: i32,
    /// Normalized cost in senone units; 0 for the frame's best density.
    pub cost: i32,
}

impl TopNEntry {
    pub fn placeholder(cw: u32) -> Self {
        Self {
            cw,
            score: WORST_SCORE,
            cost: 0,
        }
    }

    /// Ordering used for top-N lists: higher score first, then lower index.
    #[inline(always)]
    pub fn beats(&self, other: &TopNEntry) -> bool {
        self.score > other.score || (self.score == other.score && self.cw < other.cw)
    }
}
