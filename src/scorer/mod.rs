pub mod engine;
pub mod gauden;
pub mod loader;
pub mod mixw;
pub mod types;

pub use self::gauden::GaussianCodebooks;
pub use self::mixw::MixtureWeights;
pub use self::types::TopNEntry;

use crate::config::AcousticParams;
use crate::consts::SENSCR_SHIFT;
use crate::error::{DecodeError, DecodeResult};
use crate::logmath::LogMath;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Phonetically-tied mixture scorer.
///
/// Each senone is a mixture over one codebook's densities. Per frame only the
/// top-N densities of each active codebook are evaluated and combined with
/// the senone's mixture weights. Output scores are costs relative to the
/// frame's best senone: 0 is best, larger is worse.
pub struct SenoneScorer {
    codebooks: Arc<GaussianCodebooks>,
    mixw: Arc<MixtureWeights>,
    sen2cb: Vec<u16>,
    lmath_8b: LogMath,
    max_topn: usize,
    ds_ratio: usize,

    // [cb][feat][k]
    topn: Vec<TopNEntry>,
    cb_active: Vec<bool>,

    // Scratch for the current frame
    senones: Vec<usize>,
    raw: Vec<i32>,
    scores: Vec<i16>,
    best_raw: i32,
    best_senone: Option<usize>,
}

impl SenoneScorer {
    pub fn new(
        codebooks: Arc<GaussianCodebooks>,
        mixw: Arc<MixtureWeights>,
        sen2cb: Vec<u16>,
        lmath: &LogMath,
        params: &AcousticParams,
    ) -> DecodeResult<Self> {
        if params.varnorm {
            return Err(DecodeError::Config(
                "variance normalization is not supported by the tied-mixture scorer".into(),
            ));
        }
        if params.ds_ratio == 0 {
            return Err(DecodeError::Config("ds_ratio must be at least 1".into()));
        }
        if params.topn == 0 {
            return Err(DecodeError::Config("topn must be at least 1".into()));
        }
        if mixw.n_feat() != codebooks.n_feat() {
            return Err(DecodeError::Dimension(format!(
                "mixture weights have {} streams, codebooks have {}",
                mixw.n_feat(),
                codebooks.n_feat()
            )));
        }
        if mixw.n_density() != codebooks.n_density() {
            return Err(DecodeError::Dimension(format!(
                "mixture weights have {} densities, codebooks have {}",
                mixw.n_density(),
                codebooks.n_density()
            )));
        }
        if sen2cb.len() != mixw.n_sen() {
            return Err(DecodeError::Dimension(format!(
                "senone-to-codebook map has {} entries for {} senones",
                sen2cb.len(),
                mixw.n_sen()
            )));
        }
        if let Some(&cb) = sen2cb.iter().find(|&&cb| cb as usize >= codebooks.n_mgau()) {
            return Err(DecodeError::Dimension(format!(
                "senone mapped to codebook {} of {}",
                cb,
                codebooks.n_mgau()
            )));
        }

        let mut max_topn = params.topn;
        if max_topn > codebooks.n_density() {
            warn!(
                "topn {} exceeds {} densities per codebook, clamping",
                max_topn,
                codebooks.n_density()
            );
            max_topn = codebooks.n_density();
        }

        let lmath_8b = LogMath::new(lmath.base(), SENSCR_SHIFT, true)?;
        let n_mgau = codebooks.n_mgau();
        let n_feat = codebooks.n_feat();
        let n_sen = mixw.n_sen();

        let topn = (0..n_mgau * n_feat)
            .flat_map(|_| (0..max_topn as u32).map(TopNEntry::placeholder))
            .collect();

        info!(
            "Tied-mixture scorer: {} codebooks, {} streams, {} senones, top {}",
            n_mgau, n_feat, n_sen, max_topn
        );

        Ok(Self {
            codebooks,
            mixw,
            sen2cb,
            lmath_8b,
            max_topn,
            ds_ratio: params.ds_ratio,
            topn,
            cb_active: vec![false; n_mgau],
            senones: Vec::with_capacity(n_sen),
            raw: vec![0; n_sen],
            scores: vec![0; n_sen],
            best_raw: 0,
            best_senone: None,
        })
    }

    fn check_features<F: AsRef<[f32]>>(&self, features: &[F]) -> DecodeResult<()> {
        let lens = self.codebooks.feat_lens();
        if features.len() != lens.len() {
            return Err(DecodeError::Dimension(format!(
                "{} feature streams given, model has {}",
                features.len(),
                lens.len()
            )));
        }
        for (f, (x, &len)) in features.iter().zip(lens).enumerate() {
            if x.as_ref().len() != len {
                return Err(DecodeError::Dimension(format!(
                    "stream {} has {} values, expected {}",
                    f,
                    x.as_ref().len(),
                    len
                )));
            }
        }
        Ok(())
    }

    /// Scores every senone for one frame.
    pub fn score_all<F: AsRef<[f32]>>(&mut self, features: &[F], frame: i32) -> DecodeResult<&[i16]> {
        self.check_features(features)?;
        self.cb_active.fill(true);
        self.run(features, frame, None);
        Ok(&self.scores)
    }

    /// Scores only the senones in `active`, given as deltas from the previous
    /// id (the first delta is absolute). Senones outside the list score 0.
    pub fn score_active<F: AsRef<[f32]>>(
        &mut self,
        features: &[F],
        frame: i32,
        active: &[u8],
    ) -> DecodeResult<&[i16]> {
        self.check_features(features)?;
        self.cb_active.fill(false);
        let n_sen = self.mixw.n_sen();
        let mut sen = 0usize;
        for &d in active {
            sen += d as usize;
            if sen < n_sen {
                self.cb_active[self.sen2cb[sen] as usize] = true;
            }
        }
        self.run(features, frame, Some(active));
        Ok(&self.scores)
    }

    fn run<F: AsRef<[f32]>>(&mut self, features: &[F], frame: i32, active: Option<&[u8]>) {
        engine::codebook_eval(self, features, frame);
        engine::codebook_norm(self);
        engine::senone_eval(self, active);
        debug!(
            "frame {}: best senone {:?}, raw {}",
            frame, self.best_senone, self.best_raw
        );
    }

    pub fn n_senones(&self) -> usize {
        self.mixw.n_sen()
    }

    pub fn n_codebooks(&self) -> usize {
        self.codebooks.n_mgau()
    }

    pub fn feat_lens(&self) -> &[usize] {
        self.codebooks.feat_lens()
    }

    /// Effective top-N after clamping to the codebook size.
    pub fn topn(&self) -> usize {
        self.max_topn
    }

    pub fn ds_ratio(&self) -> usize {
        self.ds_ratio
    }

    /// Current top-N list for one codebook and stream, best first.
    pub fn topn_list(&self, cb: usize, feat: usize) -> &[TopNEntry] {
        let start = (cb * self.codebooks.n_feat() + feat) * self.max_topn;
        &self.topn[start..start + self.max_topn]
    }

    pub fn is_codebook_active(&self, cb: usize) -> bool {
        self.cb_active[cb]
    }

    /// Scores from the most recent frame.
    pub fn scores(&self) -> &[i16] {
        &self.scores
    }

    /// Unnormalized cost of the best senone in the last frame.
    pub fn best_raw_score(&self) -> i32 {
        self.best_raw
    }

    pub fn best_senone(&self) -> Option<usize> {
        self.best_senone
    }
}
