//! Phone-loop search.
//!
//! Every context-independent phone runs as its own HMM, and any phone may
//! follow any other. The search produces no hypothesis. Its output is a
//! per-phone penalty: how far each phone's best score fell behind the
//! overall best, weighted and smoothed as a max over a short window of
//! recent frames.

use super::{Search, SearchState, Segment};
use crate::acmod::SenoneSource;
use crate::config::PhoneLoopParams;
use crate::consts::{SENSCR_SHIFT, WORST_SCORE};
use crate::error::{DecodeError, DecodeResult};
use crate::hmm::Hmm;
use crate::logmath::LogMath;
use crate::phones::PhoneSet;
use crate::tmat::TransitionModel;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A score renormalization applied before evaluating `frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenormEvent {
    pub frame: i32,
    pub norm: i32,
}

pub struct PhoneLoopSearch {
    tmat: Arc<TransitionModel>,
    phones: PhoneSet,
    hmms: Vec<Hmm>,
    max_senone: usize,

    beam: i32,
    pbeam: i32,
    pip: i32,
    weight: f64,
    window: usize,

    // [window][n_phones], rows written round-robin
    pen_buf: Vec<i32>,
    penalties: Vec<i32>,
    buf_ptr: usize,
    buf_filled: usize,

    best_score: i32,
    frame_idx: i32,
    state: SearchState,
    renorm: Vec<RenormEvent>,
}

impl PhoneLoopSearch {
    /// `lmath` must be the unshifted model log base; thresholds are scaled
    /// down to senone units here.
    pub fn new(
        params: &PhoneLoopParams,
        lmath: &LogMath,
        tmat: Arc<TransitionModel>,
        phones: PhoneSet,
    ) -> DecodeResult<Self> {
        params.validate()?;

        let beam = lmath.log(params.pl_beam) >> SENSCR_SHIFT;
        let pbeam = lmath.log(params.pl_pbeam) >> SENSCR_SHIFT;
        let pip = lmath.log(params.pl_pip) >> SENSCR_SHIFT;
        // A beam that quantizes to 0 would prune the best phone too.
        for (name, p, q) in [
            ("pl_beam", params.pl_beam, beam),
            ("pl_pbeam", params.pl_pbeam, pbeam),
        ] {
            if q >= 0 {
                return Err(DecodeError::Config(format!(
                    "{} {} is too close to 1 to prune anything in senone units",
                    name, p
                )));
            }
        }
        info!(
            "Phone loop: beam {} pbeam {} pip {} weight {} window {}",
            beam, pbeam, pip, params.pl_weight, params.pl_window
        );

        let mut search = Self {
            tmat: Arc::clone(&tmat),
            phones: PhoneSet::default(),
            hmms: Vec::new(),
            max_senone: 0,
            beam,
            pbeam,
            pip,
            weight: params.pl_weight,
            window: params.pl_window,
            pen_buf: Vec::new(),
            penalties: Vec::new(),
            buf_ptr: 0,
            buf_filled: 0,
            best_score: 0,
            frame_idx: 0,
            state: SearchState::Uninitialized,
            renorm: Vec::new(),
        };
        search.reinit(tmat, phones)?;
        Ok(search)
    }

    /// Rebuilds the HMMs for a new model. The search must be started again.
    pub fn reinit(&mut self, tmat: Arc<TransitionModel>, phones: PhoneSet) -> DecodeResult<()> {
        // Senone ids are checked against the score source on each step.
        phones.validate(&tmat, u16::MAX as usize + 1)?;

        self.hmms = phones
            .phones
            .iter()
            .map(|p| Hmm::new(p.tmat, p.senones.clone()))
            .collect();
        self.max_senone = phones.max_senone().map_or(0, |s| s as usize);
        let n = phones.len();
        self.pen_buf = vec![0; self.window * n];
        self.penalties = vec![0; n];
        self.buf_ptr = 0;
        self.buf_filled = 0;
        self.best_score = 0;
        self.frame_idx = 0;
        self.renorm.clear();
        self.state = SearchState::Uninitialized;
        self.tmat = tmat;
        self.phones = phones;
        debug!("Phone loop holds {} phones", n);
        Ok(())
    }

    pub fn n_phones(&self) -> usize {
        self.hmms.len()
    }

    pub fn phones(&self) -> &PhoneSet {
        &self.phones
    }

    pub fn hmm(&self, phone: usize) -> Option<&Hmm> {
        self.hmms.get(phone)
    }

    /// Smoothed penalties, one per phone. 0 is unpenalized; more negative
    /// means the phone was further from the best.
    pub fn penalties(&self) -> &[i32] {
        &self.penalties
    }

    pub fn penalty(&self, phone: usize) -> Option<i32> {
        self.penalties.get(phone).copied()
    }

    pub fn best_score(&self) -> i32 {
        self.best_score
    }

    /// Next frame the search expects.
    pub fn frame_idx(&self) -> i32 {
        self.frame_idx
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn renorm_events(&self) -> &[RenormEvent] {
        &self.renorm
    }

    pub fn beam(&self) -> i32 {
        self.beam
    }

    pub fn pbeam(&self) -> i32 {
        self.pbeam
    }

    pub fn pip(&self) -> i32 {
        self.pip
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Subtracts `norm` from every HMM active at `frame`.
    pub(crate) fn renormalize(&mut self, frame: i32, norm: i32) {
        info!("Renormalizing scores at frame {}, best score {}", frame, norm);
        for hmm in self.hmms.iter_mut().filter(|h| h.is_active(frame)) {
            hmm.normalize(norm);
        }
        self.renorm.push(RenormEvent { frame, norm });
        self.best_score = 0;
    }

    fn evaluate(&mut self, frame: i32, senscr: &[i16]) {
        let tmat = &*self.tmat;
        let mut best = WORST_SCORE;
        for hmm in self.hmms.iter_mut().filter(|h| h.is_active(frame)) {
            let score = hmm.vit_eval(tmat.matrix(hmm.tmat_id()), senscr);
            if score > best {
                best = score;
            }
        }
        self.best_score = best;
    }

    fn store_penalties(&mut self) {
        let n = self.hmms.len();
        let row = &mut self.pen_buf[self.buf_ptr * n..(self.buf_ptr + 1) * n];
        for (slot, hmm) in row.iter_mut().zip(&self.hmms) {
            let diff = hmm.best_score() as i64 - self.best_score as i64;
            *slot = (diff as f64 * self.weight) as i32;
        }
        self.buf_ptr = (self.buf_ptr + 1) % self.window;
        self.buf_filled = (self.buf_filled + 1).min(self.window);

        for (i, pen) in self.penalties.iter_mut().enumerate() {
            *pen = (0..self.buf_filled)
                .map(|r| self.pen_buf[r * n + i])
                .max()
                .unwrap_or(0);
        }
    }

    fn prune(&mut self, frame: i32) {
        let thresh = self.best_score as i64 + self.beam as i64;
        for hmm in self.hmms.iter_mut().filter(|h| h.is_active(frame)) {
            if hmm.best_score() as i64 > thresh {
                hmm.set_frame(frame + 1);
            } else {
                hmm.clear_scores();
            }
        }
    }

    fn phone_transition(&mut self, frame: i32) {
        let nf = frame + 1;
        let thresh = self.best_score as i64 + self.pbeam as i64;
        for i in 0..self.hmms.len() {
            if self.hmms[i].frame() != nf {
                continue;
            }
            let new_score = self.hmms[i].out_score() as i64 + self.pip as i64;
            if new_score <= thresh {
                continue;
            }
            let new_score = new_score.max(WORST_SCORE as i64) as i32;
            let history = self.hmms[i].out_history();
            for next in self.hmms.iter_mut() {
                if next.frame() < nf || new_score > next.in_score() {
                    next.enter(new_score, history, nf);
                }
            }
        }
    }
}

impl Search for PhoneLoopSearch {
    fn name(&self) -> &'static str {
        "phone_loop"
    }

    fn start(&mut self) -> DecodeResult<()> {
        for hmm in &mut self.hmms {
            hmm.clear();
            hmm.enter(0, None, 0);
        }
        self.pen_buf.fill(0);
        self.penalties.fill(0);
        self.buf_ptr = 0;
        self.buf_filled = 0;
        self.best_score = 0;
        self.frame_idx = 0;
        self.renorm.clear();
        self.state = SearchState::Running;
        debug!("Phone loop started with {} phones", self.hmms.len());
        Ok(())
    }

    fn step(&mut self, frame: i32, source: &mut dyn SenoneSource) -> DecodeResult<()> {
        if self.state != SearchState::Running {
            return Err(DecodeError::InvalidState(format!(
                "step called while {}",
                self.state
            )));
        }
        if frame != self.frame_idx {
            return Err(DecodeError::InvalidState(format!(
                "expected frame {}, got {}",
                self.frame_idx, frame
            )));
        }
        if self.max_senone >= source.n_senones() {
            return Err(DecodeError::Dimension(format!(
                "phones reference senone {} but the model has {}",
                self.max_senone,
                source.n_senones()
            )));
        }

        source.clear_active();
        for hmm in &self.hmms {
            source.activate(hmm.senones());
        }
        let senscr = source.score(frame)?;

        if self.best_score as i64 + 2 * (self.beam as i64) < WORST_SCORE as i64 {
            self.renormalize(frame, self.best_score);
        }

        self.evaluate(frame, senscr);
        self.store_penalties();
        self.prune(frame);
        self.phone_transition(frame);

        self.frame_idx = frame + 1;
        Ok(())
    }

    fn finish(&mut self) -> DecodeResult<()> {
        if self.state != SearchState::Running {
            return Err(DecodeError::InvalidState(format!(
                "finish called while {}",
                self.state
            )));
        }
        self.state = SearchState::Finished;
        debug!("Phone loop finished after {} frames", self.frame_idx);
        Ok(())
    }

    fn hyp(&self) -> DecodeResult<(String, i32)> {
        warn!("Hypotheses are not supported by the phone loop search");
        Err(DecodeError::Unsupported("phone loop hypothesis"))
    }

    fn prob(&self) -> DecodeResult<i32> {
        warn!("Posterior probabilities are not supported by the phone loop search");
        Err(DecodeError::Unsupported("phone loop posterior"))
    }

    fn segments(&self) -> DecodeResult<Vec<Segment>> {
        warn!("Segmentation is not supported by the phone loop search");
        Err(DecodeError::Unsupported("phone loop segmentation"))
    }
}
