pub mod phone_loop;

pub use self::phone_loop::{PhoneLoopSearch, RenormEvent};

use crate::acmod::SenoneSource;
use crate::error::DecodeResult;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum SearchState {
    Uninitialized,
    Running,
    Finished,
}

/// A recognized unit and the frames it spans (inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub start_frame: i32,
    pub end_frame: i32,
}

/// Frame-synchronous search driven one frame at a time.
pub trait Search {
    fn name(&self) -> &'static str;
    fn start(&mut self) -> DecodeResult<()>;
    fn step(&mut self, frame: i32, source: &mut dyn SenoneSource) -> DecodeResult<()>;
    fn finish(&mut self) -> DecodeResult<()>;
    /// Best hypothesis text and its path score.
    fn hyp(&self) -> DecodeResult<(String, i32)>;
    /// Posterior probability of the best hypothesis, in log units.
    fn prob(&self) -> DecodeResult<i32>;
    fn segments(&self) -> DecodeResult<Vec<Segment>>;
}
