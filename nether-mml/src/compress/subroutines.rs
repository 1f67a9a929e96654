//! Subroutine extraction
//!
//! Repeated runs starting at a note are moved into named subroutines and
//! replaced by calls, across all channels of a song. The driver does not
//! keep instrument or vibrato changes made inside a subroutine, so:
//! - every call site must enter with the same instrument and vibrato, on
//!   every pass through it when the site sits in a loop body
//! - the body is prefixed with an instrument hint and the active vibrato
//! - a switch made inside the body is repeated in the caller after the call
//!
//! Replaced tokens become `None` placeholders so positions stay stable while
//! the search runs; they are dropped at the end.

use hashbrown::HashMap;

use crate::token::Token;

/// Extracted subroutine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subroutine {
    pub name: String,
    /// Prefix (hint and vibrato) followed by the extracted run
    pub body: Vec<Token>,
    /// Number of prefix tokens at the start of `body`
    pub prefix_len: usize,
}

impl Subroutine {
    /// The extracted run without its state prefix
    pub fn run(&self) -> &[Token] {
        &self.body[self.prefix_len..]
    }
}

/// Subroutines of one song, in creation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubroutineRegistry {
    subroutines: Vec<Subroutine>,
}

impl SubroutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subroutines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subroutines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subroutine> {
        self.subroutines.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Subroutine> {
        self.subroutines.iter().find(|s| s.name == name)
    }

    fn push(&mut self, subroutine: Subroutine) {
        self.subroutines.push(subroutine);
    }
}

/// Run length limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub min_length: usize,
    pub max_length: usize,
}

/// Instrument and vibrato a position is entered with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CarriedState {
    instrument: Option<String>,
    vibrato: Option<Token>,
}

impl CarriedState {
    fn apply(&mut self, token: &Token) {
        match token {
            Token::InstrumentChange(name) | Token::InstrumentHint(name) => {
                self.instrument = Some(name.clone());
            }
            Token::VibratoSet { .. } | Token::VibratoOff => self.vibrato = Some(token.clone()),
            _ => {}
        }
    }
}

/// States a position is entered with during playback
#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Unvisited,
    Once(CarriedState),
    /// Entered with different states, e.g. on different loop iterations
    Mixed,
}

/// Loop span: optional `:` position, closing position, iteration count
type LoopSpan = (Option<usize>, usize, u32);

/// Playback walk recording the entry state of every position
///
/// Every token only sets or keeps each part of the state, so a loop body
/// walked twice has reached its steady state: the first pass covers the
/// first iteration, the second pass every later one.
struct StateWalk<'t> {
    tokens: &'t [Token],
    loops: HashMap<usize, LoopSpan>,
    entries: Vec<Entry>,
}

impl<'t> StateWalk<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        let mut loops = HashMap::new();
        let mut open: Vec<(usize, Option<usize>)> = Vec::new();
        for (position, token) in tokens.iter().enumerate() {
            match token {
                Token::LoopStart => open.push((position, None)),
                Token::LoopBreak => {
                    if let Some(top) = open.last_mut() {
                        top.1 = Some(position);
                    }
                }
                Token::LoopEnd(count) => {
                    if let Some((start, break_at)) = open.pop() {
                        loops.insert(start, (break_at, position, *count));
                    }
                }
                _ => {}
            }
        }
        Self {
            tokens,
            loops,
            entries: vec![Entry::Unvisited; tokens.len()],
        }
    }

    fn enter(&mut self, position: usize, state: &CarriedState) {
        let entry = &mut self.entries[position];
        *entry = match std::mem::replace(entry, Entry::Mixed) {
            Entry::Unvisited => Entry::Once(state.clone()),
            Entry::Once(seen) if seen == *state => Entry::Once(seen),
            _ => Entry::Mixed,
        };
    }

    /// Play `start..end` from `state`, returning the state at `end`
    fn walk(&mut self, start: usize, end: usize, mut state: CarriedState) -> CarriedState {
        let tokens = self.tokens;
        let mut position = start;
        while position < end {
            self.enter(position, &state);
            let token = &tokens[position];
            if let Token::LoopStart = token
                && let Some((break_at, close, count)) = self.loops.get(&position).copied()
            {
                let last_pass_end = break_at.unwrap_or(close);
                if count <= 1 {
                    state = self.walk(position + 1, last_pass_end, state);
                } else {
                    let again = self.walk(position + 1, close, state.clone());
                    if again != state {
                        self.walk(position + 1, close, again.clone());
                    }
                    state = match break_at {
                        Some(_) => self.walk(position + 1, last_pass_end, again),
                        None => again,
                    };
                }
                position = close + 1;
                continue;
            }
            state.apply(token);
            position += 1;
        }
        state
    }
}

/// Entry state of every position of a channel
fn entry_states(tokens: &[Token]) -> Vec<Entry> {
    let mut walk = StateWalk::new(tokens);
    walk.walk(0, tokens.len(), CarriedState::default());
    walk.entries
}

/// State after playing a balanced run entered with `entry`
fn exit_state(run: &[Token], entry: CarriedState) -> CarriedState {
    StateWalk::new(run).walk(0, run.len(), entry)
}

/// Channel position
type Site = (usize, usize);

/// Shortest run: the call plus both carried switches must fit in its slots
const MIN_RUN: usize = 3;

struct Extractor<'a> {
    slots: Vec<Vec<Option<Token>>>,
    /// Entry states of the unreplaced channels; calls keep the caller's
    /// state, so replacing a run leaves them valid
    entries: Vec<Vec<Entry>>,
    limits: ExtractLimits,
    registry: &'a mut SubroutineRegistry,
    counter: &'a mut usize,
}

/// Extract repeated runs from all channels
///
/// `counter` numbers the subroutines (`sub0`, `sub1`, ...) and keeps
/// counting across calls.
pub fn extract_subroutines(
    channels: &mut [Vec<Token>],
    limits: ExtractLimits,
    registry: &mut SubroutineRegistry,
    counter: &mut usize,
) {
    let limits = ExtractLimits {
        min_length: limits.min_length.max(MIN_RUN),
        ..limits
    };
    let entries = channels.iter().map(|tokens| entry_states(tokens)).collect();
    let slots = channels
        .iter_mut()
        .map(|tokens| std::mem::take(tokens).into_iter().map(Some).collect())
        .collect();
    let mut extractor = Extractor {
        slots,
        entries,
        limits,
        registry,
        counter,
    };
    extractor.run();

    for (tokens, slots) in channels.iter_mut().zip(extractor.slots) {
        *tokens = slots.into_iter().flatten().collect();
    }
}

/// Cut a run at the first token a subroutine can't contain and drop an
/// unfinished trailing loop. `None` when no balanced run is left.
fn balanced_run(tokens: Vec<Token>) -> Option<Vec<Token>> {
    let mut run = Vec::with_capacity(tokens.len());
    let mut level: usize = 0;
    for token in tokens {
        match token {
            Token::LoopStart => level += 1,
            Token::LoopEnd(_) => {
                if level == 0 {
                    break;
                }
                level -= 1;
            }
            Token::LoopBreak if level == 0 => break,
            Token::LoopPoint | Token::SubroutineCall(_) => break,
            _ => {}
        }
        run.push(token);
    }

    // Unfinished loops: drop tokens until every opened loop is gone
    while level > 0 {
        match run.pop()? {
            Token::LoopStart => level -= 1,
            Token::LoopEnd(_) => level += 1,
            _ => {}
        }
    }
    Some(run)
}

/// Shorten a run by one token, removing a whole loop if it ends with one.
/// `false` when the loop has no matching start.
fn shrink(run: &mut Vec<Token>) -> bool {
    if let Some(Token::LoopEnd(_)) = run.pop() {
        let mut level = 1;
        while level > 0 {
            match run.pop() {
                Some(Token::LoopStart) => level -= 1,
                Some(Token::LoopEnd(_)) => level += 1,
                Some(_) => {}
                None => return false,
            }
        }
    }
    true
}

impl Extractor<'_> {
    fn run(&mut self) {
        let index = self.note_index();
        for channel in 0..self.slots.len() {
            let mut position = 0;
            while position < self.slots[channel].len() {
                self.try_extract((channel, position), &index);
                position += 1;
            }
        }
    }

    /// Positions of every note-class token, by token
    fn note_index(&self) -> HashMap<Token, Vec<Site>> {
        let mut index: HashMap<Token, Vec<Site>> = HashMap::new();
        for (channel, slots) in self.slots.iter().enumerate() {
            for (position, slot) in slots.iter().enumerate() {
                if let Some(token) = slot
                    && token.is_note()
                {
                    index
                        .entry(token.clone())
                        .or_default()
                        .push((channel, position));
                }
            }
        }
        index
    }

    /// The single state a site is always entered with
    fn carried_state(&self, (channel, position): Site) -> Option<&CarriedState> {
        match self.entries[channel].get(position) {
            Some(Entry::Once(state)) => Some(state),
            _ => None,
        }
    }

    /// Does the run occur unconsumed at `site`?
    fn matches_at(&self, (channel, position): Site, run: &[Token]) -> bool {
        let Some(slots) = self.slots[channel].get(position..position + run.len()) else {
            return false;
        };
        slots
            .iter()
            .zip(run)
            .all(|(slot, token)| slot.as_ref() == Some(token))
    }

    fn try_extract(&mut self, site: Site, index: &HashMap<Token, Vec<Site>>) {
        let (channel, position) = site;
        let Some(Some(first)) = self.slots[channel].get(position) else {
            return;
        };
        if !first.is_note() {
            return;
        }
        let Some(locations) = index.get(first) else {
            return;
        };
        let later: Vec<Site> = locations.iter().copied().filter(|&s| s > site).collect();
        if later.is_empty() {
            return;
        }

        let raw: Vec<Token> = self.slots[channel][position..]
            .iter()
            .take(self.limits.max_length)
            .map_while(|slot| slot.clone())
            .collect();
        let Some(mut run) = balanced_run(raw) else {
            return;
        };

        let Some(carried) = self.carried_state(site).cloned() else {
            return;
        };
        while run.len() >= self.limits.min_length {
            let sites = self.find_sites(site, &run, &later, &carried);
            if !sites.is_empty() {
                self.replace(site, sites, run, carried);
                return;
            }
            if !shrink(&mut run) {
                return;
            }
        }
    }

    /// Non-overlapping later sites holding the same run in the same state
    fn find_sites(
        &self,
        source: Site,
        run: &[Token],
        candidates: &[Site],
        carried: &CarriedState,
    ) -> Vec<Site> {
        let mut sites: Vec<Site> = Vec::new();
        let mut taken_until = (source.0, source.1 + run.len());
        for &candidate in candidates {
            if candidate.0 == taken_until.0 && candidate.1 < taken_until.1 {
                continue;
            }
            if self.matches_at(candidate, run) && self.carried_state(candidate) == Some(carried) {
                sites.push(candidate);
                taken_until = (candidate.0, candidate.1 + run.len());
            }
        }
        sites
    }

    fn replace(&mut self, source: Site, sites: Vec<Site>, run: Vec<Token>, carried: CarriedState) {
        let name = format!("sub{}", *self.counter);
        *self.counter += 1;

        let mut body = Vec::with_capacity(run.len() + 2);
        if let Some(instrument) = &carried.instrument {
            body.push(Token::InstrumentHint(instrument.clone()));
        }
        if let Some(vibrato @ Token::VibratoSet { .. }) = &carried.vibrato {
            body.push(vibrato.clone());
        }
        let prefix_len = body.len();

        // Switches made inside the run are repeated by the caller
        let exit = exit_state(&run, carried.clone());
        let instrument_out = exit
            .instrument
            .filter(|i| carried.instrument.as_ref() != Some(i))
            .map(Token::InstrumentChange);
        let vibrato_out = exit.vibrato.filter(|v| carried.vibrato.as_ref() != Some(v));

        let length = run.len();
        body.extend(run);
        tracing::debug!(
            "!{}: {} tokens, {} call sites",
            name,
            length,
            sites.len() + 1
        );

        for (channel, position) in std::iter::once(source).chain(sites) {
            let slots = &mut self.slots[channel][position..position + length];
            slots.fill(None);
            slots[0] = Some(Token::SubroutineCall(name.clone()));
            slots[1] = instrument_out.clone();
            slots[2] = vibrato_out.clone();
        }

        self.registry.push(Subroutine {
            name,
            body,
            prefix_len,
        });
    }
}

/// Collapse subroutines with identical bodies into the first one
pub fn merge_subroutines(channels: &mut [Vec<Token>], registry: &mut SubroutineRegistry) {
    let mut renamed: HashMap<String, String> = HashMap::new();
    let mut kept: Vec<Subroutine> = Vec::with_capacity(registry.len());
    for subroutine in std::mem::take(&mut registry.subroutines) {
        match kept.iter().find(|k| k.body == subroutine.body) {
            Some(existing) => {
                tracing::debug!("!{} is identical to !{}", subroutine.name, existing.name);
                renamed.insert(subroutine.name, existing.name.clone());
            }
            None => kept.push(subroutine),
        }
    }
    registry.subroutines = kept;

    if renamed.is_empty() {
        return;
    }
    for token in channels.iter_mut().flatten() {
        if let Token::SubroutineCall(name) = token
            && let Some(target) = renamed.get(name.as_str())
        {
            *name = target.clone();
        }
    }
}

/// Inline every call, dropping the state prefix of each body
pub fn expand_subroutines(tokens: &[Token], registry: &SubroutineRegistry) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::SubroutineCall(name) => match registry.get(name) {
                Some(subroutine) => out.extend_from_slice(subroutine.run()),
                None => out.push(token.clone()),
            },
            _ => out.push(token.clone()),
        }
    }
    out
}
