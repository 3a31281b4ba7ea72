use super::loader::{load_gauden_param, GaudenParam};
use crate::error::{DecodeError, DecodeResult};
use crate::logmath::LogMath;
use std::path::Path;
use tracing::{debug, info};

/// Diagonal-covariance Gaussian codebooks, one set of densities per codebook
/// per feature stream.
///
/// Means are kept as loaded. Variances are stored as `1 / (2 var ln b)` and
/// each density carries its log normalizer in base-`b` units, so a density's
/// log-likelihood is `det - sum((x - m)^2 * ivar)` directly in log units.
#[derive(Debug, Clone)]
pub struct GaussianCodebooks {
    n_mgau: usize,
    n_density: usize,
    feat_lens: Vec<usize>,
    // per stream: [mgau][density][dim]
    means: Vec<Vec<f32>>,
    inv_vars: Vec<Vec<f32>>,
    // per stream: [mgau][density]
    dets: Vec<Vec<f32>>,
}

impl GaussianCodebooks {
    /// `means` and `vars` hold one flat `[mgau][density][dim]` buffer per
    /// feature stream.
    pub fn new(
        n_mgau: usize,
        n_density: usize,
        feat_lens: Vec<usize>,
        means: Vec<Vec<f32>>,
        vars: Vec<Vec<f32>>,
        varfloor: f32,
        lmath: &LogMath,
    ) -> DecodeResult<Self> {
        if n_mgau == 0 || n_density == 0 || feat_lens.is_empty() || feat_lens.contains(&0) {
            return Err(DecodeError::Dimension(
                "codebooks need at least one codebook, density and stream".into(),
            ));
        }
        if means.len() != feat_lens.len() || vars.len() != feat_lens.len() {
            return Err(DecodeError::Dimension(format!(
                "{} streams declared, got {} mean and {} variance buffers",
                feat_lens.len(),
                means.len(),
                vars.len()
            )));
        }

        let inv_lb = lmath.inv_log_of_base();
        let ln_2pi = (2.0 * std::f64::consts::PI).ln();
        let mut inv_vars = Vec::with_capacity(feat_lens.len());
        let mut dets = Vec::with_capacity(feat_lens.len());
        let mut n_floored = 0usize;

        for (f, &len) in feat_lens.iter().enumerate() {
            let expected = n_mgau * n_density * len;
            if means[f].len() != expected || vars[f].len() != expected {
                return Err(DecodeError::Dimension(format!(
                    "stream {}: expected {} values, got {} means and {} variances",
                    f,
                    expected,
                    means[f].len(),
                    vars[f].len()
                )));
            }

            let mut ivar = Vec::with_capacity(expected);
            let mut det = Vec::with_capacity(n_mgau * n_density);
            for gauss in vars[f].chunks(len) {
                let mut log_det = 0.5 * len as f64 * ln_2pi;
                for &v in gauss {
                    let v = if v < varfloor {
                        n_floored += 1;
                        varfloor
                    } else {
                        v
                    };
                    log_det += 0.5 * (v as f64).ln();
                    ivar.push((inv_lb / (2.0 * v as f64)) as f32);
                }
                det.push((-log_det * inv_lb) as f32);
            }
            inv_vars.push(ivar);
            dets.push(det);
        }

        if n_floored > 0 {
            debug!("{} variance values floored to {}", n_floored, varfloor);
        }

        Ok(Self {
            n_mgau,
            n_density,
            feat_lens,
            means,
            inv_vars,
            dets,
        })
    }

    /// Reads a means file and a variances file of matching shape.
    pub fn load<P1: AsRef<Path>, P2: AsRef<Path>>(
        mean_path: P1,
        var_path: P2,
        varfloor: f32,
        lmath: &LogMath,
    ) -> DecodeResult<Self> {
        info!("Reading means: {}", mean_path.as_ref().display());
        let means = load_gauden_param(mean_path)?;
        info!("Reading variances: {}", var_path.as_ref().display());
        let vars = load_gauden_param(var_path)?;
        Self::from_params(means, vars, varfloor, lmath)
    }

    pub fn from_params(
        means: GaudenParam,
        vars: GaudenParam,
        varfloor: f32,
        lmath: &LogMath,
    ) -> DecodeResult<Self> {
        if means.n_mgau != vars.n_mgau
            || means.n_density != vars.n_density
            || means.feat_lens != vars.feat_lens
        {
            return Err(DecodeError::Dimension(format!(
                "means ({} x {} x {:?}) and variances ({} x {} x {:?}) disagree",
                means.n_mgau,
                means.n_density,
                means.feat_lens,
                vars.n_mgau,
                vars.n_density,
                vars.feat_lens
            )));
        }
        let n_mgau = means.n_mgau;
        let n_density = means.n_density;
        let feat_lens = means.feat_lens.clone();
        Self::new(
            n_mgau,
            n_density,
            feat_lens,
            means.into_streams(),
            vars.into_streams(),
            varfloor,
            lmath,
        )
    }

    pub fn n_mgau(&self) -> usize {
        self.n_mgau
    }

    pub fn n_feat(&self) -> usize {
        self.feat_lens.len()
    }

    pub fn n_density(&self) -> usize {
        self.n_density
    }

    pub fn feat_lens(&self) -> &[usize] {
        &self.feat_lens
    }

    #[inline(always)]
    fn offset(&self, mgau: usize, feat: usize, density: usize) -> usize {
        (mgau * self.n_density + density) * self.feat_lens[feat]
    }

    #[inline(always)]
    pub fn mean(&self, mgau: usize, feat: usize, density: usize) -> &[f32] {
        let o = self.offset(mgau, feat, density);
        &self.means[feat][o..o + self.feat_lens[feat]]
    }

    #[inline(always)]
    pub fn inv_var(&self, mgau: usize, feat: usize, density: usize) -> &[f32] {
        let o = self.offset(mgau, feat, density);
        &self.inv_vars[feat][o..o + self.feat_lens[feat]]
    }

    #[inline(always)]
    pub fn det(&self, mgau: usize, feat: usize, density: usize) -> f32 {
        self.dets[feat][mgau * self.n_density + density]
    }
}
