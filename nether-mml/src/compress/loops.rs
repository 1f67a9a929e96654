//! Loop folding
//!
//! Greedy left-to-right search for repeated windows. Each folded loop body
//! is free of loop and loop-point tokens; later passes can still nest a loop
//! inside an earlier body, because the closing bracket then ends the window.

use crate::token::{MAX_LOOP_COUNT, Token};

/// Smallest body worth folding
const MIN_BODY: usize = 2;

/// Covered tokens must exceed this for a loop to pay off
const MIN_COVERED: usize = 3;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    length: usize,
    /// Extra repetitions after the first occurrence
    repeats: usize,
}

impl Candidate {
    fn covered(self) -> usize {
        self.length * (self.repeats + 1)
    }
}

/// Best loop starting at `start`
fn best_candidate(tokens: &[Token], start: usize, max_body: usize) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for length in MIN_BODY..=max_body {
        let end = start + length;
        if end > tokens.len() {
            break;
        }
        if tokens[end - 1].is_loop_boundary() {
            break;
        }
        let body = &tokens[start..end];

        let mut repeats = 0;
        while repeats + 1 < MAX_LOOP_COUNT as usize {
            let from = start + length * (repeats + 1);
            match tokens.get(from..from + length) {
                Some(window) if window == body => repeats += 1,
                _ => break,
            }
        }
        if repeats == 0 {
            continue;
        }

        let candidate = Candidate { length, repeats };
        if best.is_none_or(|b| candidate.covered() > b.covered()) {
            best = Some(candidate);
        }
    }
    best
}

/// One folding pass
pub fn fold_loops(tokens: &[Token], max_body: usize) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut index = 0;

    while index < tokens.len() {
        let token = &tokens[index];
        if token.is_loop_boundary() {
            out.push(token.clone());
            index += 1;
            continue;
        }

        let Some(best) = best_candidate(tokens, index, max_body)
            .filter(|c| c.covered() > MIN_COVERED)
        else {
            out.push(token.clone());
            index += 1;
            continue;
        };

        let body = &tokens[index..index + best.length];
        index += best.covered();
        let mut iterations = best.repeats + 1;

        // A partial copy of the body right after the loop becomes one more
        // iteration cut short by a break marker
        let prefix = if iterations < MAX_LOOP_COUNT as usize {
            body.iter()
                .zip(&tokens[index..])
                .take(best.length - 1)
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            0
        };

        out.push(Token::LoopStart);
        if prefix > 0 {
            out.extend_from_slice(&body[..prefix]);
            out.push(Token::LoopBreak);
            out.extend_from_slice(&body[prefix..]);
            iterations += 1;
            index += prefix;
        } else {
            out.extend_from_slice(body);
        }
        out.push(Token::LoopEnd(iterations as u32));
    }
    out
}

/// Several folding passes
pub fn fold_loops_passes(mut tokens: Vec<Token>, passes: usize, max_body: usize) -> Vec<Token> {
    for _ in 0..passes {
        tokens = fold_loops(&tokens, max_body);
    }
    tokens
}

/// Unroll every loop, inverse of [`fold_loops`]
pub fn expand_loops(tokens: &[Token]) -> Vec<Token> {
    let mut index = 0;
    expand_level(tokens, &mut index).body
}

/// Tokens of one loop level
struct Level {
    body: Vec<Token>,
    /// Body up to the break marker, played on the last iteration
    head: Option<Vec<Token>>,
    /// Iteration count, `None` at the top level
    iterations: Option<u32>,
}

fn expand_level(tokens: &[Token], index: &mut usize) -> Level {
    let mut body = Vec::new();
    let mut head = None;
    while let Some(token) = tokens.get(*index) {
        *index += 1;
        match token {
            Token::LoopStart => {
                let inner = expand_level(tokens, index);
                let iterations = inner.iterations.unwrap_or(1);
                for _ in 1..iterations {
                    body.extend_from_slice(&inner.body);
                }
                if iterations > 0 {
                    body.extend(inner.head.unwrap_or(inner.body));
                }
            }
            Token::LoopEnd(count) => {
                return Level {
                    body,
                    head,
                    iterations: Some(*count),
                };
            }
            Token::LoopBreak if head.is_none() => head = Some(body.clone()),
            token => body.push(token.clone()),
        }
    }
    Level {
        body,
        head,
        iterations: None,
    }
}
