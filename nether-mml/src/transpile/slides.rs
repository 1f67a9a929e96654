//! Volume and pan slides longer than one driver command
//!
//! A slide command covers at most [`MAX_TICKS`] driver ticks. Longer slides
//! are cut into chunks whose deltas add up to the full amount; every chunk
//! after the first is placed at the driver tick where the previous one ends,
//! splitting the note, wait or rest that is playing at that moment.

use crate::token::{MAX_TICKS, Pitch, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlideKind {
    Volume,
    Pan,
}

impl SlideKind {
    fn of(token: &Token) -> Option<(Self, i16, u32)> {
        match *token {
            Token::VolumeSlide { delta, ticks } => Some((Self::Volume, delta, ticks)),
            Token::PanSlide { delta, ticks } => Some((Self::Pan, delta, ticks)),
            _ => None,
        }
    }

    fn token(self, delta: i16, ticks: u32) -> Token {
        match self {
            Self::Volume => Token::VolumeSlide { delta, ticks },
            Self::Pan => Token::PanSlide { delta, ticks },
        }
    }

    /// A later command of the same kind replaces the running slide
    fn is_replaced_by(self, token: &Token) -> bool {
        match self {
            Self::Volume => matches!(token, Token::VolumeSlide { .. } | Token::VolumeChange(_)),
            Self::Pan => matches!(token, Token::PanSlide { .. } | Token::PanSet(_)),
        }
    }
}

/// Slide chunk due at an absolute driver tick
#[derive(Debug, Clone, Copy)]
struct Chunk {
    at: u64,
    kind: SlideKind,
    delta: i16,
    ticks: u32,
}

/// Cut a slide into `(delta, ticks)` pieces of at most [`MAX_TICKS`]
///
/// Each piece gets its proportional share of the delta, rounded toward zero;
/// the last piece takes the remainder so the total is exact.
pub fn split_slide(delta: i16, ticks: u32) -> Vec<(i16, u32)> {
    let mut pieces = Vec::with_capacity(ticks.div_ceil(MAX_TICKS) as usize);
    let mut done = 0;
    let mut given: i64 = 0;
    while done < ticks {
        let length = (ticks - done).min(MAX_TICKS);
        done += length;
        let part = if done == ticks {
            delta as i64 - given
        } else {
            delta as i64 * length as i64 / ticks as i64
        };
        given += part;
        pieces.push((part as i16, length));
    }
    pieces
}

/// Cut a timed token after `at` ticks (`0 < at < ticks`)
fn split_timed(token: Token, at: u32) -> (Token, Token) {
    let rest = token.ticks() - at;
    match token {
        Token::Rest(_) => (Token::Rest(at), Token::Rest(rest)),
        Token::Note { pitch, .. } => (
            Token::Note {
                pitch,
                ticks: at,
                tie: true,
            },
            Token::Wait(rest),
        ),
        Token::NoiseNote { frequency, .. } => (
            Token::NoiseNote {
                frequency,
                ticks: at,
                tie: true,
            },
            Token::Wait(rest),
        ),
        Token::ArpeggioNote { notes, speed, .. } => (
            Token::ArpeggioNote {
                notes,
                ticks: at,
                speed,
            },
            Token::Wait(rest),
        ),
        Token::SlideNote {
            from,
            to,
            ticks,
            tie,
        } => {
            let span = to.semitones() as f64 - from.semitones() as f64;
            let middle = Pitch::from_semitones(
                (from.semitones() as f64 + span * at as f64 / ticks as f64).round() as i16,
            );
            let head = if middle == from {
                Token::Note {
                    pitch: from,
                    ticks: at,
                    tie: true,
                }
            } else {
                Token::SlideNote {
                    from,
                    to: middle,
                    ticks: at,
                    tie: true,
                }
            };
            let tail = if middle == to {
                Token::Wait(rest)
            } else {
                Token::SlideNote {
                    from: middle,
                    to,
                    ticks: rest,
                    tie,
                }
            };
            (head, tail)
        }
        _ => (Token::Wait(at), Token::Wait(rest)),
    }
}

/// Split every slide longer than [`MAX_TICKS`] and schedule its chunks
pub fn spread_slides(tokens: Vec<Token>) -> Vec<Token> {
    let long = |t: &Token| SlideKind::of(t).is_some_and(|(_, _, ticks)| ticks > MAX_TICKS);
    if !tokens.iter().any(long) {
        return tokens;
    }

    let mut out = Vec::with_capacity(tokens.len() + 8);
    let mut pending: Vec<Chunk> = Vec::new();
    let mut now: u64 = 0;

    for token in tokens {
        pending.retain(|c| !c.kind.is_replaced_by(&token));

        if let Some((kind, delta, ticks)) = SlideKind::of(&token)
            && ticks > MAX_TICKS
        {
            let mut at = now;
            for (i, (delta, ticks)) in split_slide(delta, ticks).into_iter().enumerate() {
                if i == 0 {
                    out.push(kind.token(delta, ticks));
                } else {
                    pending.push(Chunk {
                        at,
                        kind,
                        delta,
                        ticks,
                    });
                }
                at += ticks as u64;
            }
            pending.sort_by_key(|c| c.at);
            continue;
        }

        let mut token = token;
        loop {
            while let Some(chunk) = pending.first().copied()
                && chunk.at <= now
            {
                out.push(chunk.kind.token(chunk.delta, chunk.ticks));
                pending.remove(0);
            }
            let ticks = token.ticks() as u64;
            match pending.first() {
                Some(chunk) if ticks > 0 && chunk.at < now + ticks => {
                    let (head, tail) = split_timed(token, (chunk.at - now) as u32);
                    now = chunk.at;
                    out.push(head);
                    token = tail;
                }
                _ => {
                    now += ticks;
                    out.push(token);
                    break;
                }
            }
        }
    }
    out
}
