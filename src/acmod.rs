use crate::config::AcousticParams;
use crate::error::{DecodeError, DecodeResult};
use crate::scorer::SenoneScorer;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// What a search needs from an acoustic model: senone activation and
/// per-frame scores (costs relative to the frame's best, 0 = best).
pub trait SenoneSource {
    fn n_senones(&self) -> usize;
    fn clear_active(&mut self);
    fn activate(&mut self, senones: &[u16]);
    fn score(&mut self, frame: i32) -> DecodeResult<&[i16]>;
}

/// Set of senones the search wants scored this frame.
#[derive(Debug, Clone)]
pub struct SenoneActivity {
    flags: Vec<bool>,
    n_active: usize,
}

impl SenoneActivity {
    pub fn new(n_senones: usize) -> Self {
        Self {
            flags: vec![false; n_senones],
            n_active: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn clear(&mut self) {
        self.flags.fill(false);
        self.n_active = 0;
    }

    /// Ids past the senone count are ignored.
    pub fn activate(&mut self, senones: &[u16]) {
        for &s in senones {
            if let Some(flag) = self.flags.get_mut(s as usize) {
                if !*flag {
                    *flag = true;
                    self.n_active += 1;
                }
            }
        }
    }

    pub fn activate_all(&mut self) {
        self.flags.fill(true);
        self.n_active = self.flags.len();
    }

    pub fn is_active(&self, senone: usize) -> bool {
        self.flags.get(senone).copied().unwrap_or(false)
    }

    pub fn n_active(&self) -> usize {
        self.n_active
    }

    /// Active senones as byte deltas from the previous id, the first taken
    /// from 0. Gaps wider than 255 are bridged with 255-steps, which adds a
    /// few extra senones to the scored set.
    pub fn delta_list(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.n_active);
        self.fill_delta_list(&mut out);
        out
    }

    pub fn fill_delta_list(&self, out: &mut Vec<u8>) {
        out.clear();
        let mut prev = 0usize;
        for (sen, _) in self.flags.iter().enumerate().filter(|&(_, &a)| a) {
            let mut gap = sen - prev;
            while gap > u8::MAX as usize {
                out.push(u8::MAX);
                gap -= u8::MAX as usize;
            }
            out.push(gap as u8);
            prev = sen;
        }
    }
}

/// Feature queue plus scorer. Frames are pushed by the caller and consumed
/// in order by `score`.
pub struct AcousticModel {
    scorer: SenoneScorer,
    activity: SenoneActivity,
    compute_all: bool,
    frames: VecDeque<Vec<Vec<f32>>>,
    // Frame index of frames[0]
    first_frame: i32,
    deltas: Vec<u8>,
}

impl AcousticModel {
    pub fn new(scorer: SenoneScorer, params: &AcousticParams) -> Self {
        let activity = SenoneActivity::new(scorer.n_senones());
        Self {
            scorer,
            activity,
            compute_all: params.compallsen,
            frames: VecDeque::new(),
            first_frame: 0,
            deltas: Vec::new(),
        }
    }

    /// Queues one frame of features (one vector per stream) and returns its
    /// frame index.
    pub fn push_frame(&mut self, features: Vec<Vec<f32>>) -> DecodeResult<i32> {
        let lens = self.scorer.feat_lens();
        if features.len() != lens.len()
            || features.iter().zip(lens).any(|(x, &len)| x.len() != len)
        {
            return Err(DecodeError::Dimension(format!(
                "frame has stream lengths {:?}, model expects {:?}",
                features.iter().map(Vec::len).collect::<Vec<_>>(),
                lens
            )));
        }
        self.frames.push_back(features);
        Ok(self.first_frame + self.frames.len() as i32 - 1)
    }

    /// Drops queued frames and restarts numbering at 0.
    pub fn reset(&mut self) {
        if !self.frames.is_empty() {
            debug!("Discarding {} queued frames", self.frames.len());
        }
        self.frames.clear();
        self.first_frame = 0;
        self.activity.clear();
    }

    pub fn n_queued(&self) -> usize {
        self.frames.len()
    }

    pub fn compute_all(&self) -> bool {
        self.compute_all
    }

    pub fn set_compute_all(&mut self, on: bool) {
        self.compute_all = on;
    }

    pub fn scorer(&self) -> &SenoneScorer {
        &self.scorer
    }

    pub fn activity(&self) -> &SenoneActivity {
        &self.activity
    }
}

impl SenoneSource for AcousticModel {
    fn n_senones(&self) -> usize {
        self.scorer.n_senones()
    }

    fn clear_active(&mut self) {
        self.activity.clear();
    }

    fn activate(&mut self, senones: &[u16]) {
        self.activity.activate(senones);
    }

    fn score(&mut self, frame: i32) -> DecodeResult<&[i16]> {
        let last = self.first_frame + self.frames.len() as i32;
        if frame < self.first_frame || frame >= last {
            warn!(
                "Frame {} requested, queue holds [{}, {})",
                frame, self.first_frame, last
            );
            return Err(DecodeError::FrameUnavailable(frame));
        }
        while self.first_frame < frame {
            self.frames.pop_front();
            self.first_frame += 1;
        }

        let features = self.frames[0].as_slice();
        if self.compute_all || self.activity.n_active() == self.activity.len() {
            self.scorer.score_all(features, frame)
        } else {
            self.activity.fill_delta_list(&mut self.deltas);
            self.scorer.score_active(features, frame, &self.deltas)
        }
    }
}
