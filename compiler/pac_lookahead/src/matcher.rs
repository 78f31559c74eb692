//! Combined token matcher.
//!
//! A [`TokenMatcher`] holds every candidate pattern of one decision point,
//! each tagged with the alternative it selects. One [`TokenMatcher::advance`]
//! call tests all of them against the bytes at the cursor.
//!
//! Candidates are tried in declaration order and the first full match wins,
//! even when a later candidate would match more bytes. A candidate that the
//! window is still a true prefix of blocks every candidate after it: the
//! answer is [`MatchResult::NeedMore`] until it either matches or fails.

use std::fmt;

use pac_ir::Pattern;
use regex_automata::dfa::{dense, Automaton, StartKind};
use regex_automata::nfa::thompson;
use regex_automata::util::syntax;
use regex_automata::{Anchored, Input};

/// Answer of one matcher step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchResult {
    /// Alternative `alternative` matched the first `len` bytes of the window.
    Matched { alternative: usize, len: usize },
    /// Undecided; more input may settle it.
    NeedMore,
    /// No candidate can match, whatever input follows.
    NoMatch,
}

/// A regular expression that failed to compile.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid regular expression /{pattern}/: {message}")]
pub struct InvalidPattern {
    pub pattern: String,
    pub message: String,
}

#[derive(Clone)]
enum Compiled {
    Bytes(Vec<u8>),
    Regex(Box<dense::DFA<Vec<u32>>>),
}

impl fmt::Debug for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compiled::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Compiled::Regex(dfa) => write!(f, "Regex({} bytes)", dfa.memory_usage()),
        }
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    alternative: usize,
    pattern: Pattern,
    compiled: Compiled,
}

enum Progress {
    Full(usize),
    Partial,
    Failed,
}

#[derive(Clone, Debug)]
pub struct TokenMatcher {
    candidates: Vec<Candidate>,
}

impl TokenMatcher {
    /// Build a matcher from `(alternative, pattern)` pairs in priority order.
    pub fn new(
        candidates: impl IntoIterator<Item = (usize, Pattern)>,
    ) -> Result<Self, InvalidPattern> {
        let candidates = candidates
            .into_iter()
            .map(|(alternative, pattern)| {
                let compiled = compile(&pattern)?;
                Ok(Candidate {
                    alternative,
                    pattern,
                    compiled,
                })
            })
            .collect::<Result<Vec<_>, InvalidPattern>>()?;
        Ok(TokenMatcher { candidates })
    }

    /// Matcher for a single literal; a match reports alternative 0.
    pub fn single(pattern: Pattern) -> Result<Self, InvalidPattern> {
        TokenMatcher::new([(0, pattern)])
    }

    pub fn candidates(&self) -> impl Iterator<Item = (usize, &Pattern)> {
        self.candidates.iter().map(|c| (c.alternative, &c.pattern))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Test every candidate against `window`, the bytes at the cursor.
    ///
    /// `eod` means no input will follow the window; [`MatchResult::NeedMore`]
    /// is never returned then.
    pub fn advance(&self, window: &[u8], eod: bool) -> MatchResult {
        for candidate in &self.candidates {
            let progress = match &candidate.compiled {
                Compiled::Bytes(bytes) => bytes_progress(bytes, window, eod),
                Compiled::Regex(dfa) => regex_progress(dfa, window, eod),
            };
            match progress {
                Progress::Full(len) => {
                    return MatchResult::Matched {
                        alternative: candidate.alternative,
                        len,
                    }
                }
                Progress::Partial => return MatchResult::NeedMore,
                Progress::Failed => {}
            }
        }
        MatchResult::NoMatch
    }
}

fn compile(pattern: &Pattern) -> Result<Compiled, InvalidPattern> {
    match pattern {
        Pattern::Bytes(bytes) => Ok(Compiled::Bytes(bytes.clone())),
        Pattern::RegExp(re) => {
            // Patterns run over raw bytes, not UTF-8 text.
            let dfa = dense::Builder::new()
                .configure(dense::DFA::config().start_kind(StartKind::Anchored))
                .syntax(syntax::Config::new().unicode(false).utf8(false))
                .thompson(thompson::Config::new().utf8(false))
                .build(re)
                .map_err(|e| InvalidPattern {
                    pattern: re.clone(),
                    message: e.to_string(),
                })?;
            Ok(Compiled::Regex(Box::new(dfa)))
        }
    }
}

fn bytes_progress(pattern: &[u8], window: &[u8], eod: bool) -> Progress {
    if window.len() >= pattern.len() {
        if window.starts_with(pattern) {
            Progress::Full(pattern.len())
        } else {
            Progress::Failed
        }
    } else if !eod && pattern.starts_with(window) {
        Progress::Partial
    } else {
        Progress::Failed
    }
}

/// Longest anchored match. Undecided while the DFA is alive at the end of a
/// window that more input may extend.
fn regex_progress(dfa: &dense::DFA<Vec<u32>>, window: &[u8], eod: bool) -> Progress {
    let input = Input::new(window).anchored(Anchored::Yes);
    let Ok(mut state) = dfa.start_state_forward(&input) else {
        return Progress::Failed;
    };
    let mut last = None;
    for (i, &byte) in window.iter().enumerate() {
        state = dfa.next_state(state, byte);
        // Matches are reported one transition late: a match state after
        // byte `i` means a match of length `i`.
        if dfa.is_match_state(state) {
            last = Some(i);
        }
        if dfa.is_dead_state(state) || dfa.is_quit_state(state) {
            return last.map_or(Progress::Failed, Progress::Full);
        }
    }
    if !eod {
        // Settled early only if no byte can extend the match and ending the
        // input here would not report a longer one.
        let stuck = (0..=u8::MAX).all(|b| dfa.is_dead_state(dfa.next_state(state, b)));
        if !stuck || dfa.is_match_state(dfa.next_eoi_state(state)) {
            return Progress::Partial;
        }
        return last.map_or(Progress::Failed, Progress::Full);
    }
    state = dfa.next_eoi_state(state);
    if dfa.is_match_state(state) {
        last = Some(window.len());
    }
    last.map_or(Progress::Failed, Progress::Full)
}
