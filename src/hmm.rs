//! A single phone HMM and its Viterbi update.

use crate::consts::{TMAT_WORST_SCORE, WORST_SCORE};
use crate::tmat::TransitionMatrix;

/// Opaque back-pointer carried along the best path. `None` marks the start
/// of the utterance.
pub type HistoryId = Option<u32>;

#[derive(Debug, Clone)]
pub struct Hmm {
    tmat_id: usize,
    senones: Vec<u16>,
    // score[0] doubles as the entry ("in") score
    score: Vec<i32>,
    history: Vec<HistoryId>,
    out_score: i32,
    out_history: HistoryId,
    best_score: i32,
    frame: i32,
    st_sen_scr: Vec<i32>,
}

impl Hmm {
    pub fn new(tmat_id: usize, senones: Vec<u16>) -> Self {
        let n = senones.len();
        let mut hmm = Self {
            tmat_id,
            senones,
            score: vec![WORST_SCORE; n],
            history: vec![None; n],
            out_score: WORST_SCORE,
            out_history: None,
            best_score: WORST_SCORE,
            frame: -1,
            st_sen_scr: vec![WORST_SCORE; n],
        };
        hmm.clear();
        hmm
    }

    pub fn tmat_id(&self) -> usize {
        self.tmat_id
    }

    pub fn senones(&self) -> &[u16] {
        &self.senones
    }

    pub fn n_emit_state(&self) -> usize {
        self.senones.len()
    }

    pub fn in_score(&self) -> i32 {
        self.score[0]
    }

    pub fn score(&self, state: usize) -> i32 {
        self.score[state]
    }

    pub fn history(&self, state: usize) -> HistoryId {
        self.history[state]
    }

    pub fn out_score(&self) -> i32 {
        self.out_score
    }

    pub fn out_history(&self) -> HistoryId {
        self.out_history
    }

    pub fn best_score(&self) -> i32 {
        self.best_score
    }

    /// Frame at which this HMM is (or was last) active.
    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
    }

    pub fn is_active(&self, frame: i32) -> bool {
        self.frame >= frame
    }

    pub fn clear_scores(&mut self) {
        self.score.fill(WORST_SCORE);
        self.out_score = WORST_SCORE;
        self.best_score = WORST_SCORE;
    }

    pub fn clear(&mut self) {
        self.clear_scores();
        self.history.fill(None);
        self.out_history = None;
        self.frame = -1;
    }

    pub fn enter(&mut self, score: i32, history: HistoryId, frame: i32) {
        self.score[0] = score;
        self.history[0] = history;
        self.frame = frame;
    }

    /// Subtracts `amount` from every live score.
    pub fn normalize(&mut self, amount: i32) {
        for s in self.score.iter_mut() {
            if *s > WORST_SCORE {
                *s -= amount;
            }
        }
        if self.out_score > WORST_SCORE {
            self.out_score -= amount;
        }
        if self.best_score > WORST_SCORE {
            self.best_score -= amount;
        }
    }

    /// One Viterbi step over any upper-triangular topology. `senscore` holds
    /// senone costs for the current frame. Returns the best state score,
    /// including the exit state.
    pub fn vit_eval(&mut self, tmat: TransitionMatrix<'_>, senscore: &[i16]) -> i32 {
        let final_state = self.n_emit_state();

        for i in 0..final_state {
            let senscr = -(senscore[self.senones[i] as usize] as i32);
            self.st_sen_scr[i] = self.score[i].saturating_add(senscr);
        }

        // Exit state: no self transition.
        let mut scr = WORST_SCORE;
        let mut bestfrom = None;
        for from in (0..final_state).rev() {
            let tp = tmat.tprob(from, final_state);
            if tp > TMAT_WORST_SCORE {
                let newscr = self.st_sen_scr[from].saturating_add(tp);
                if newscr > scr {
                    scr = newscr;
                    bestfrom = Some(from);
                }
            }
        }
        self.out_score = scr;
        if let Some(from) = bestfrom {
            self.out_history = self.history[from];
        }
        let mut bestscr = scr;

        // Emitting states, last to first, so predecessors still hold the
        // previous frame's histories.
        for i in (0..final_state).rev() {
            let tp = tmat.tprob(i, i);
            let mut scr = if tp > TMAT_WORST_SCORE {
                self.st_sen_scr[i].saturating_add(tp)
            } else {
                WORST_SCORE
            };
            let mut bestfrom = i;
            for from in (0..i).rev() {
                let tp = tmat.tprob(from, i);
                if tp > TMAT_WORST_SCORE {
                    let newscr = self.st_sen_scr[from].saturating_add(tp);
                    if newscr > scr {
                        scr = newscr;
                        bestfrom = from;
                    }
                }
            }
            self.score[i] = scr;
            if bestfrom != i {
                self.history[i] = self.history[bestfrom];
            }
            if scr > bestscr {
                bestscr = scr;
            }
        }

        self.best_score = bestscr;
        bestscr
    }
}
