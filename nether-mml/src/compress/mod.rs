//! Loss-free compression of token streams
//!
//! Two passes, both purely structural:
//! - [`fold_loops`] turns repeated runs inside a channel into `[ ... ]N`
//! - [`extract_subroutines`] moves runs repeated anywhere in the song into
//!   `!subN` subroutines, followed by [`merge_subroutines`]

mod loops;
mod subroutines;


pub use loops::{expand_loops, fold_loops, fold_loops_passes};
pub use subroutines::{
    ExtractLimits, Subroutine, SubroutineRegistry, expand_subroutines, extract_subroutines,
    merge_subroutines,
};

use crate::config::CompressionConfig;
use crate::token::Token;

/// Run the enabled passes over every channel of a song
pub fn compress_song(
    channels: &mut [Vec<Token>],
    config: &CompressionConfig,
    registry: &mut SubroutineRegistry,
    counter: &mut usize,
) {
    if config.loops {
        for tokens in channels.iter_mut() {
            *tokens = fold_loops_passes(
                std::mem::take(tokens),
                config.level.loop_passes(),
                config.max_loop_body,
            );
        }
    }
    if config.subroutines {
        let limits = ExtractLimits {
            min_length: config.min_subroutine_length,
            max_length: config.max_subroutine_length,
        };
        extract_subroutines(channels, limits, registry, counter);
        merge_subroutines(channels, registry);
    }
}
