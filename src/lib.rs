pub mod acmod;
pub mod config;
pub mod consts;
pub mod error;
pub mod hmm;
pub mod logmath;
pub mod phones;
pub mod s3file;
pub mod scorer;
pub mod search;
pub mod tmat;

pub use error::{DecodeError, DecodeResult};
