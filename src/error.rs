use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model Format Error: {0}")]
    Format(String),

    #[error("Checksum mismatch: file has {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },

    #[error("Dimension Error: {0}")]
    Dimension(String),

    #[error("Topology Error in tmat {tmat}: transition {src} -> {dst} {reason}")]
    Topology {
        tmat: usize,
        src: usize,
        dst: usize,
        reason: &'static str,
    },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Invalid search state: {0}")]
    InvalidState(String),

    #[error("Frame {0} is not available for scoring")]
    FrameUnavailable(i32),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
