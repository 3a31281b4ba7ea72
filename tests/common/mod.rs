#![allow(dead_code)]

use phoneloop::acmod::SenoneSource;
use phoneloop::config::AcousticParams;
use phoneloop::error::{DecodeError, DecodeResult};
use phoneloop::logmath::LogMath;
use phoneloop::scorer::loader::MixwParam;
use phoneloop::scorer::{GaussianCodebooks, MixtureWeights, SenoneScorer};
use phoneloop::tmat::TransitionModel;
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn model_lmath() -> LogMath {
    LogMath::new(1.0001, 0, true).expect("model logmath")
}

// --- TRANSITION FIXTURES ---

/// 3-state left-to-right costs: stay free, advance for 40.
pub const LEFT_TO_RIGHT: [u8; 12] = [
    0, 40, 255, 255, //
    255, 0, 40, 255, //
    255, 255, 0, 40,
];

pub fn left_to_right_tmat(n_tmat: usize) -> TransitionModel {
    let costs = LEFT_TO_RIGHT.repeat(n_tmat);
    TransitionModel::from_costs(3, costs).expect("valid topology")
}

pub fn left_to_right_probs() -> Vec<f32> {
    vec![
        0.5, 0.5, 0.0, 0.0, //
        0.0, 0.5, 0.5, 0.0, //
        0.0, 0.0, 0.5, 0.5,
    ]
}

// --- SCRIPTED SCORES ---

/// Score source that replays fixed senone scores, one row per frame.
pub struct ScriptedSource {
    pub n_senones: usize,
    pub frames: Vec<Vec<i16>>,
    pub active: Vec<bool>,
}

impl ScriptedSource {
    pub fn new(n_senones: usize, frames: Vec<Vec<i16>>) -> Self {
        Self {
            n_senones,
            frames,
            active: vec![false; n_senones],
        }
    }

    pub fn constant(n_senones: usize, value: i16, n_frames: usize) -> Self {
        Self::new(n_senones, vec![vec![value; n_senones]; n_frames])
    }

    /// Frames where the phones owning `good` senones score 0 and every
    /// other senone scores `bad`.
    pub fn favoring(n_senones: usize, good: &[u16], bad: i16, n_frames: usize) -> Vec<Vec<i16>> {
        let mut row = vec![bad; n_senones];
        for &s in good {
            row[s as usize] = 0;
        }
        vec![row; n_frames]
    }
}

impl SenoneSource for ScriptedSource {
    fn n_senones(&self) -> usize {
        self.n_senones
    }

    fn clear_active(&mut self) {
        self.active.fill(false);
    }

    fn activate(&mut self, senones: &[u16]) {
        for &s in senones {
            self.active[s as usize] = true;
        }
    }

    fn score(&mut self, frame: i32) -> DecodeResult<&[i16]> {
        usize::try_from(frame)
            .ok()
            .and_then(|f| self.frames.get(f))
            .map(Vec::as_slice)
            .ok_or(DecodeError::FrameUnavailable(frame))
    }
}

// --- GAUSSIAN FIXTURES ---

/// One stream, unit variances. `means[cb][density]` is a point in
/// `dim` dimensions.
pub fn codebooks(means: &[Vec<Vec<f32>>], lmath: &LogMath) -> GaussianCodebooks {
    let n_mgau = means.len();
    let n_density = means[0].len();
    let dim = means[0][0].len();
    let flat: Vec<f32> = means.iter().flatten().flatten().copied().collect();
    let vars = vec![1.0; flat.len()];
    GaussianCodebooks::new(n_mgau, n_density, vec![dim], vec![flat], vec![vars], 1e-4, lmath)
        .expect("codebooks")
}

/// Mixture weights for one stream, `weights[sen]` over densities.
pub fn mixture(weights: &[Vec<f32>], lmath: &LogMath) -> MixtureWeights {
    let param = MixwParam {
        n_sen: weights.len(),
        n_feat: 1,
        n_density: weights[0].len(),
        data: weights.iter().flatten().copied().collect(),
    };
    MixtureWeights::from_param(&param, lmath, 1e-7).expect("mixture weights")
}

/// Two codebooks of four 2-d densities and four senones (two per codebook).
pub fn small_scorer(params: &AcousticParams) -> DecodeResult<SenoneScorer> {
    let lmath = model_lmath();
    let g = codebooks(
        &[
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
            vec![vec![3.0, 3.0], vec![4.0, 3.0], vec![3.0, 4.0], vec![4.0, 4.0]],
        ],
        &lmath,
    );
    let m = mixture(
        &[
            vec![0.7, 0.1, 0.1, 0.1],
            vec![0.1, 0.1, 0.1, 0.7],
            vec![0.4, 0.3, 0.2, 0.1],
            vec![0.1, 0.2, 0.3, 0.4],
        ],
        &lmath,
    );
    SenoneScorer::new(Arc::new(g), Arc::new(m), vec![0, 0, 1, 1], &lmath, params)
}

/// Seeded synthetic single-stream frames.
pub fn random_frames(seed: u64, n: usize, dim: usize, lo: f32, hi: f32) -> Vec<Vec<Vec<f32>>> {
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..n)
        .map(|_| vec![(0..dim).map(|_| lo + rng.f32() * (hi - lo)).collect()])
        .collect()
}
