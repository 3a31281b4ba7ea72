//! Per-phone HMM transition matrices, quantized to byte costs.

use crate::consts::{MODEL_PARAM_VERSION, SENSCR_SHIFT, TMAT_DISALLOWED};
use crate::error::{DecodeError, DecodeResult};
use crate::logmath::LogMath;
use crate::s3file::{checked_product, S3Reader, S3Writer};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// `n_tmat` matrices of `n_state x (n_state + 1)` costs, row-major.
/// Column `n_state` is the non-emitting exit state.
#[derive(Debug, Clone)]
pub struct TransitionModel {
    n_tmat: usize,
    n_state: usize,
    costs: Vec<u8>,
}

/// Borrowed view of one matrix.
#[derive(Debug, Clone, Copy)]
pub struct TransitionMatrix<'a> {
    n_state: usize,
    costs: &'a [u8],
}

impl<'a> TransitionMatrix<'a> {
    pub fn n_state(&self) -> usize {
        self.n_state
    }

    #[inline(always)]
    pub fn cost(&self, src: usize, dst: usize) -> u8 {
        self.costs[src * (self.n_state + 1) + dst]
    }

    /// Transition log-probability in search units (negated cost).
    #[inline(always)]
    pub fn tprob(&self, src: usize, dst: usize) -> i32 {
        -(self.cost(src, dst) as i32)
    }

    pub fn row(&self, src: usize) -> &'a [u8] {
        let w = self.n_state + 1;
        &self.costs[src * w..(src + 1) * w]
    }
}

fn sum_norm(row: &mut [f32]) -> f32 {
    let sum: f32 = row.iter().sum();
    if sum != 0.0 {
        row.iter_mut().for_each(|p| *p /= sum);
    }
    sum
}

fn nz_floor(row: &mut [f32], floor: f32) {
    for p in row.iter_mut() {
        if *p != 0.0 && *p < floor {
            *p = floor;
        }
    }
}

impl TransitionModel {
    pub fn load<P: AsRef<Path>>(path: P, lmath: &LogMath, tpfloor: f32) -> DecodeResult<Self> {
        let path = path.as_ref();
        info!("Reading HMM transition probability matrices: {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), lmath, tpfloor)
    }

    pub fn from_reader<R: Read>(reader: R, lmath: &LogMath, tpfloor: f32) -> DecodeResult<Self> {
        let mut rdr = S3Reader::new(reader)?;
        rdr.check_version(MODEL_PARAM_VERSION);

        let n_tmat = rdr.read_i32("n_tmat")?;
        let n_src = rdr.read_i32("n_src")?;
        let n_dst = rdr.read_i32("n_dst")?;
        let n_coef = rdr.read_i32("coefficient count")?;

        if n_tmat <= 0 || n_tmat >= i16::MAX as i32 {
            return Err(DecodeError::Format(format!(
                "number of transition matrices ({}) out of range",
                n_tmat
            )));
        }
        if n_src <= 0 || n_src.checked_add(1) != Some(n_dst) {
            return Err(DecodeError::Dimension(format!(
                "source states ({}) + 1 != destination states ({})",
                n_src, n_dst
            )));
        }
        let (n_tmat, n_src, n_dst) = (n_tmat as usize, n_src as usize, n_dst as usize);
        let expected = checked_product(&[n_tmat, n_src, n_dst])?;
        if n_coef < 0 || n_coef as usize != expected {
            return Err(DecodeError::Dimension(format!(
                "coefficient count {} != {} x {} x {}",
                n_coef, n_tmat, n_src, n_dst
            )));
        }

        let mut matrices = Vec::with_capacity(n_tmat);
        for _ in 0..n_tmat {
            matrices.push(rdr.read_f32s(n_src * n_dst, "transition matrix")?);
        }
        rdr.verify_checksum()?;
        rdr.expect_eof()?;

        Self::from_probabilities(n_src, &matrices, lmath, tpfloor)
    }

    /// Normalizes, floors and quantizes raw probability matrices, then checks
    /// topology.
    pub fn from_probabilities(
        n_state: usize,
        matrices: &[Vec<f32>],
        lmath: &LogMath,
        tpfloor: f32,
    ) -> DecodeResult<Self> {
        let n_dst = n_state + 1;
        let mut costs = Vec::with_capacity(matrices.len() * n_state * n_dst);

        for (t, probs) in matrices.iter().enumerate() {
            if probs.len() != n_state * n_dst {
                return Err(DecodeError::Dimension(format!(
                    "tmat {} has {} coefficients, expected {}",
                    t,
                    probs.len(),
                    n_state * n_dst
                )));
            }
            for src in 0..n_state {
                let mut row = probs[src * n_dst..(src + 1) * n_dst].to_vec();
                if sum_norm(&mut row) == 0.0 {
                    warn!("Normalization failed for tmat {} from state {}", t, src);
                }
                nz_floor(&mut row, tpfloor);
                sum_norm(&mut row);
                for &p in &row {
                    let ltp = (-(lmath.log(p as f64) as i64)) >> SENSCR_SHIFT;
                    costs.push(ltp.clamp(0, TMAT_DISALLOWED as i64) as u8);
                }
            }
        }

        Self::from_costs(n_state, costs)
    }

    /// Builds a model from already quantized costs.
    pub fn from_costs(n_state: usize, costs: Vec<u8>) -> DecodeResult<Self> {
        let stride = n_state * (n_state + 1);
        if n_state == 0 || costs.is_empty() || costs.len() % stride != 0 {
            return Err(DecodeError::Dimension(format!(
                "{} costs do not form {}-state matrices",
                costs.len(),
                n_state
            )));
        }
        let model = Self {
            n_tmat: costs.len() / stride,
            n_state,
            costs,
        };
        model.validate_upper_triangular()?;
        model.validate_single_skip()?;
        model.log_summary();
        Ok(model)
    }

    pub fn n_tmat(&self) -> usize {
        self.n_tmat
    }

    /// Emitting states per matrix.
    pub fn n_state(&self) -> usize {
        self.n_state
    }

    pub fn matrix(&self, id: usize) -> TransitionMatrix<'_> {
        let stride = self.n_state * (self.n_state + 1);
        TransitionMatrix {
            n_state: self.n_state,
            costs: &self.costs[id * stride..(id + 1) * stride],
        }
    }

    pub fn validate_upper_triangular(&self) -> DecodeResult<()> {
        for t in 0..self.n_tmat {
            let m = self.matrix(t);
            for dst in 0..self.n_state {
                for src in dst + 1..self.n_state {
                    if m.cost(src, dst) < TMAT_DISALLOWED {
                        return Err(DecodeError::Topology {
                            tmat: t,
                            src,
                            dst,
                            reason: "goes backwards (matrix is not upper triangular)",
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn validate_single_skip(&self) -> DecodeResult<()> {
        for t in 0..self.n_tmat {
            let m = self.matrix(t);
            for src in 0..self.n_state {
                for dst in src + 3..=self.n_state {
                    if m.cost(src, dst) < TMAT_DISALLOWED {
                        return Err(DecodeError::Topology {
                            tmat: t,
                            src,
                            dst,
                            reason: "skips more than one state",
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        debug!(
            "{} transition matrices, {} emitting states",
            self.n_tmat, self.n_state
        );
        for t in 0..self.n_tmat {
            let m = self.matrix(t);
            for src in 0..self.n_state {
                debug!("tmat {} [{}]: {:?}", t, src, m.row(src));
            }
        }
    }

    /// Writes raw (unquantized) matrices in the loadable file format.
    pub fn write_probabilities<W: Write>(
        writer: W,
        n_state: usize,
        matrices: &[Vec<f32>],
        with_checksum: bool,
        big_endian: bool,
    ) -> DecodeResult<W> {
        let n_dst = n_state + 1;
        let mut w = S3Writer::new(
            writer,
            &[("version", MODEL_PARAM_VERSION)],
            with_checksum,
            big_endian,
        )?;
        w.write_i32s(&[
            matrices.len() as i32,
            n_state as i32,
            n_dst as i32,
            (matrices.len() * n_state * n_dst) as i32,
        ])?;
        for m in matrices {
            w.write_f32s(m)?;
        }
        w.finish()
    }

    pub fn save_probabilities<P: AsRef<Path>>(
        path: P,
        n_state: usize,
        matrices: &[Vec<f32>],
    ) -> DecodeResult<()> {
        let file = File::create(path)?;
        Self::write_probabilities(BufWriter::new(file), n_state, matrices, true, false)?;
        Ok(())
    }
}
