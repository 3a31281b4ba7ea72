use super::loader::{load_mixw_param, MixwParam};
use crate::consts::{MAX_NEG_MIXW, SENSCR_SHIFT};
use crate::error::{DecodeError, DecodeResult};
use crate::logmath::LogMath;
use std::path::Path;
use tracing::{info, warn};

/// Quantized mixture weights, stored as costs (`-log(w) >> SENSCR_SHIFT`)
/// capped at `MAX_NEG_MIXW`.
#[derive(Debug, Clone)]
pub struct MixtureWeights {
    n_sen: usize,
    n_feat: usize,
    n_density: usize,
    // [feat][density][sen]
    costs: Vec<u8>,
}

impl MixtureWeights {
    pub fn load<P: AsRef<Path>>(path: P, lmath: &LogMath, floor: f32) -> DecodeResult<Self> {
        info!("Reading mixture weights: {}", path.as_ref().display());
        let param = load_mixw_param(path)?;
        Self::from_param(&param, lmath, floor)
    }

    /// Normalizes, floors, renormalizes and quantizes each senone's
    /// distribution per stream.
    pub fn from_param(param: &MixwParam, lmath: &LogMath, floor: f32) -> DecodeResult<Self> {
        let MixwParam {
            n_sen,
            n_feat,
            n_density,
            ref data,
        } = *param;
        if data.len() != n_sen * n_feat * n_density {
            return Err(DecodeError::Dimension(format!(
                "{} mixture weights for {} x {} x {}",
                data.len(),
                n_sen,
                n_feat,
                n_density
            )));
        }

        let mut costs = vec![MAX_NEG_MIXW as u8; n_feat * n_density * n_sen];
        let mut n_err = 0usize;
        for s in 0..n_sen {
            for f in 0..n_feat {
                let start = (s * n_feat + f) * n_density;
                let mut pdf = data[start..start + n_density].to_vec();
                let sum: f32 = pdf.iter().sum();
                if sum <= 0.0 {
                    n_err += 1;
                    continue;
                }
                pdf.iter_mut().for_each(|p| *p = (*p / sum).max(floor));
                let sum: f32 = pdf.iter().sum();
                for (d, p) in pdf.iter().enumerate() {
                    let qscr = (-(lmath.log((p / sum) as f64) as i64)) >> SENSCR_SHIFT;
                    let qscr = if (0..=MAX_NEG_MIXW as i64).contains(&qscr) {
                        qscr
                    } else {
                        MAX_NEG_MIXW as i64
                    };
                    costs[(f * n_density + d) * n_sen + s] = qscr as u8;
                }
            }
        }
        if n_err > 0 {
            warn!("Weight normalization failed for {} mixture weights", n_err);
        }

        Ok(Self {
            n_sen,
            n_feat,
            n_density,
            costs,
        })
    }

    pub fn n_sen(&self) -> usize {
        self.n_sen
    }

    pub fn n_feat(&self) -> usize {
        self.n_feat
    }

    pub fn n_density(&self) -> usize {
        self.n_density
    }

    #[inline(always)]
    pub fn cost(&self, feat: usize, density: usize, sen: usize) -> i32 {
        self.costs[(feat * self.n_density + density) * self.n_sen + sen] as i32
    }
}
