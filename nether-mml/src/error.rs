//! Conversion errors

/// Errors that abort the conversion of a song
#[derive(Debug, thiserror::Error)]
pub enum MmlError {
    #[error("No driver timer fits {ticks_per_second} ticks/s at speeds {speeds:?}")]
    TimingUnresolvable { ticks_per_second: f64, speeds: Vec<u8> },

    #[error(
        "Timing override for {ticks_per_second} ticks/s speed {speed} is invalid \
         (timer {timer}, ticks {ticks})"
    )]
    InvalidTimingOverride {
        ticks_per_second: f64,
        speed: u8,
        timer: u16,
        ticks: u16,
    },

    #[error("Song has no channels or no order rows")]
    EmptySong,

    #[error("Invalid conversion options: {0}")]
    Config(#[from] toml::de::Error),
}

impl MmlError {
    /// Check if this is a timing failure (unresolvable tempo or bad override)
    pub fn is_timing(&self) -> bool {
        matches!(
            self,
            Self::TimingUnresolvable { .. } | Self::InvalidTimingOverride { .. }
        )
    }
}

/// Result alias for conversion operations
pub type Result<T> = core::result::Result<T, MmlError>;
