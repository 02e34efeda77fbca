#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Buffer is too short to contain the header structure it claims to hold.
    #[error("Not enough bytes for header; got {actual}, need {minimum}")]
    MalformedHeader { actual: usize, minimum: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid channel count {0}; must be a power of 2 no larger than 2^31")]
    InvalidChannelCount(u64),

    /// No corner-turn kernel exists for this channel count and sample size.
    #[error("Unsupported shape: {channels} channels of {bits_per_sample}-bit samples")]
    UnsupportedShape { channels: usize, bits_per_sample: u32 },

    #[error("No frame sync found")]
    NoSyncFound,

    #[error("Overflow")]
    Overflow,
    #[error("Underflow")]
    Underflow,

    #[error("Frame number {frame} is beyond {frames_per_second} frames per second")]
    FrameOutOfRange { frame: u32, frames_per_second: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
