//! Song conversion pipeline
//!
//! A [`ConversionContext`] owns everything that lives longer than one song:
//! the options, the memoized tempo resolver and the subroutine counter.
//! Songs converted with the same context get distinct subroutine names.

use std::fmt;

use nether_tracker::{CHANNEL_NAMES, MAX_CHANNELS, TrackerSong};

use crate::compress::{SubroutineRegistry, compress_song};
use crate::config::{CompressionConfig, ConversionOptions};
use crate::error::{MmlError, Result};
use crate::linearize::linearize;
use crate::tempo::TempoResolver;
use crate::token::{Token, render_tokens};
use crate::transpile::{SongInfo, transpile_channel};

// =============================================================================
// Output
// =============================================================================

/// One output channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmlChannel {
    /// Channel letter (`A`..`H`)
    pub name: char,
    pub tokens: Vec<Token>,
}

/// A converted song
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmlSong {
    pub title: String,
    /// Driver timer register value
    pub timer: u16,
    /// Channels with at least one note, in letter order
    pub channels: Vec<MmlChannel>,
    pub subroutines: SubroutineRegistry,
}

impl MmlSong {
    /// Channel by letter
    pub fn channel(&self, name: char) -> Option<&MmlChannel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Tokens in channels and subroutine bodies
    pub fn token_count(&self) -> usize {
        self.channels.iter().map(|c| c.tokens.len()).sum::<usize>()
            + self.subroutines.iter().map(|s| s.body.len()).sum::<usize>()
    }

    /// Full MML text
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MmlSong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#Title {}", self.title)?;
        writeln!(f, "#Timer {}", self.timer)?;

        if !self.subroutines.is_empty() {
            writeln!(f)?;
            for subroutine in self.subroutines.iter() {
                writeln!(f, "!{} {}", subroutine.name, render_tokens(&subroutine.body))?;
            }
        }

        writeln!(f)?;
        for channel in &self.channels {
            writeln!(f, "{} {}", channel.name, render_tokens(&channel.tokens))?;
        }
        Ok(())
    }
}

// =============================================================================
// Context
// =============================================================================

/// State shared across the songs of one conversion run
#[derive(Debug, Clone)]
pub struct ConversionContext {
    compression: CompressionConfig,
    resolver: TempoResolver,
    subroutine_count: usize,
}

impl Default for ConversionContext {
    fn default() -> Self {
        Self::new(ConversionOptions::default())
    }
}

impl ConversionContext {
    pub fn new(options: ConversionOptions) -> Self {
        Self {
            compression: options.compression,
            resolver: TempoResolver::new(options.timing),
            subroutine_count: 0,
        }
    }

    /// Subroutines named so far
    pub fn subroutine_count(&self) -> usize {
        self.subroutine_count
    }

    /// Convert one song
    pub fn convert_song(&mut self, song: &TrackerSong) -> Result<MmlSong> {
        let linear = linearize(song, &mut self.resolver)?;
        let timer = linear.initial_timer().ok_or(MmlError::EmptySong)?;

        if linear.channels.len() > MAX_CHANNELS {
            tracing::warn!(
                "'{}' has {} channels, only the first {} are converted",
                song.name,
                linear.channels.len(),
                MAX_CHANNELS
            );
        }

        let info = SongInfo {
            speeds: &linear.speeds,
            loop_point: linear.loop_point,
            instruments: &song.instruments,
            arpeggio_speed: song.arpeggio_speed,
            volume_max: song.volume_max,
        };
        let mut names = Vec::with_capacity(MAX_CHANNELS);
        let mut channels = Vec::with_capacity(MAX_CHANNELS);
        for (&name, rows) in CHANNEL_NAMES.iter().zip(&linear.channels) {
            let tokens = transpile_channel(rows, &info);
            if !tokens.iter().any(Token::is_note) {
                tracing::debug!("'{}' channel {} is silent, dropped", song.name, name);
                continue;
            }
            names.push(name);
            channels.push(tokens);
        }
        let uncompressed: usize = channels.iter().map(Vec::len).sum();

        let mut subroutines = SubroutineRegistry::new();
        compress_song(
            &mut channels,
            &self.compression,
            &mut subroutines,
            &mut self.subroutine_count,
        );

        let song = MmlSong {
            title: song.name.clone(),
            timer,
            channels: names
                .into_iter()
                .zip(channels)
                .map(|(name, tokens)| MmlChannel { name, tokens })
                .collect(),
            subroutines,
        };
        tracing::info!(
            "Converted '{}': {} channels, {} subroutines, {} tokens ({} before compression)",
            song.title,
            song.channels.len(),
            song.subroutines.len(),
            song.token_count(),
            uncompressed
        );
        Ok(song)
    }

    /// Convert several songs; a failing song doesn't stop the others
    pub fn convert_batch(&mut self, songs: &[TrackerSong]) -> Vec<Result<MmlSong>> {
        songs
            .iter()
            .map(|song| {
                let result = self.convert_song(song);
                if let Err(e) = &result {
                    tracing::error!("Failed to convert '{}': {}", song.name, e);
                }
                result
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TimingConfig, TimingMode};
    use nether_tracker::{TrackerChannel, TrackerInstrument, TrackerPattern, TrackerRow};

    const C4: u8 = 108;

    fn options() -> ConversionOptions {
        ConversionOptions {
            timing: TimingConfig {
                mode: TimingMode::LowError,
                ..TimingConfig::default()
            },
            ..ConversionOptions::default()
        }
    }

    fn song(channels: Vec<Vec<TrackerRow>>) -> TrackerSong {
        let mut song = TrackerSong::new("demo", channels[0].len() as u16);
        song.instruments.push(TrackerInstrument::new("lead"));
        for rows in channels {
            song.channels
                .push(TrackerChannel::from_patterns(vec![TrackerPattern { rows }]));
        }
        song
    }

    fn melody() -> Vec<TrackerRow> {
        vec![
            TrackerRow::with_note(C4).instrument(0),
            TrackerRow::default(),
            TrackerRow::default(),
            TrackerRow::off(),
        ]
    }

    #[test]
    fn test_convert_song_drops_silent_channels() {
        let song = song(vec![melody(), vec![TrackerRow::default(); 4]]);
        let mml = ConversionContext::new(options()).convert_song(&song).unwrap();

        assert_eq!(mml.title, "demo");
        assert_eq!(mml.timer, 80);
        assert_eq!(mml.channels.len(), 1);
        let channel = mml.channel('A').unwrap();
        assert_eq!(render_tokens(&channel.tokens), "L @lead o4c%30 r%10");
        assert!(mml.channel('B').is_none());
    }

    #[test]
    fn test_render() {
        let song = song(vec![melody()]);
        let mml = ConversionContext::new(options()).convert_song(&song).unwrap();
        assert_eq!(
            mml.render(),
            "#Title demo\n#Timer 80\n\nA L @lead o4c%30 r%10\n"
        );
    }

    #[test]
    fn test_subroutine_names_continue_across_songs() {
        let mut rows = Vec::new();
        for note in [C4, C4 + 2, C4 + 4, C4 + 5, C4 + 7] {
            rows.push(TrackerRow::with_note(note).instrument(0));
            rows.push(TrackerRow::default());
        }
        let song = song(vec![rows.clone(), rows]);

        let mut context = ConversionContext::new(options());
        let first = context.convert_song(&song).unwrap();
        let second = context.convert_song(&song).unwrap();

        assert_eq!(first.subroutines.len(), 1);
        assert!(first.subroutines.get("sub0").is_some());
        assert!(second.subroutines.get("sub1").is_some());
        assert_eq!(context.subroutine_count(), 2);
        assert!(second.render().contains("\nA L @lead !sub1\n"));
    }

    #[test]
    fn test_batch_keeps_going_after_failure() {
        let good = song(vec![melody()]);
        let empty = TrackerSong::new("empty", 4);

        let results = ConversionContext::new(options()).convert_batch(&[empty, good]);

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(MmlError::EmptySong)));
        assert!(results[1].is_ok());
    }

    #[test]
    fn test_unresolvable_timing_fails_song() {
        let mut song = song(vec![melody()]);
        song.ticks_per_second = 0.0;

        let err = ConversionContext::new(options())
            .convert_song(&song)
            .unwrap_err();
        assert!(err.is_timing());
    }
}
