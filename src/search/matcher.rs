//! Pattern compilation and line matching over two engines
//!
//! A [`CompiledExpression`] holds immutable engine state and is cheap to
//! clone and share between threads. Each call site that matches lines gets
//! its own [`Matcher`] from [`CompiledExpression::create_matcher`]; the
//! matcher owns whatever scratch memory its engine needs.
//!
//! # Engines
//! * Automaton (feature `automaton`): one Aho-Corasick automaton over every
//!   sub-pattern, used when all of them are plain literals. Scanning a line
//!   once reports every sub-pattern that occurs in it.
//! * Regex: one `grep-regex` matcher per sub-pattern, for everything else.
//!
//! The engine is picked at runtime for each expression.
//!
//! # Semantics
//! A line matches when every including sub-pattern occurs in it (the
//! required match count is the number of including sub-patterns, counted
//! over distinct sub-patterns) and no excluding sub-pattern does. With a
//! single pattern this is "occurs", inverted when the pattern excludes.

use crate::error::{LogscanError, Result};
use crate::search::pattern::Pattern;
#[cfg(feature = "automaton")]
use aho_corasick::{AhoCorasick, MatchKind};
use grep_matcher::Matcher as _;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use log::debug;
use std::sync::Arc;

/// Which engine a matcher runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherEngine {
    Automaton,
    Regex,
}

/// Knobs for [`CompiledExpression::compile_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Try the automaton engine before falling back to regex
    pub allow_automaton: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            allow_automaton: true,
        }
    }
}

/// How many including sub-patterns must fire, and which ones exclude
#[derive(Debug, Clone)]
struct Requirement {
    is_exclude: Vec<bool>,
    required_matches: usize,
}

impl Requirement {
    fn new(patterns: &[Pattern]) -> Self {
        let is_exclude: Vec<bool> = patterns.iter().map(|p| p.is_exclude).collect();
        let required_matches = is_exclude.iter().filter(|&&exclude| !exclude).count();
        Self {
            is_exclude,
            required_matches,
        }
    }

    fn has_excludes(&self) -> bool {
        self.is_exclude.len() > self.required_matches
    }
}

#[cfg(feature = "automaton")]
#[derive(Debug)]
struct LiteralAutomaton {
    automaton: AhoCorasick,
    requirement: Requirement,
}

#[derive(Debug)]
struct RegexPatterns {
    matchers: Vec<RegexMatcher>,
    requirement: Requirement,
}

#[derive(Debug, Clone)]
enum CompiledEngine {
    #[cfg(feature = "automaton")]
    Automaton(Arc<LiteralAutomaton>),
    Regex(Arc<RegexPatterns>),
}

/// Immutable, thread-shareable compiled form of one or more patterns
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    patterns: Arc<[Pattern]>,
    engine: CompiledEngine,
}

impl CompiledExpression {
    /// Compile a single pattern
    pub fn compile(pattern: &Pattern) -> Result<Self> {
        Self::compile_all(std::slice::from_ref(pattern))
    }

    /// Compile a combination of patterns into one expression
    pub fn compile_all(patterns: &[Pattern]) -> Result<Self> {
        Self::compile_with(patterns, CompileOptions::default())
    }

    /// Compile with explicit engine preferences
    ///
    /// # Errors
    /// * `InvalidPattern` if the list is empty or a sub-pattern is rejected
    ///   by the regex engine
    pub fn compile_with(patterns: &[Pattern], options: CompileOptions) -> Result<Self> {
        if patterns.is_empty() {
            return Err(LogscanError::invalid_pattern("", "no pattern given"));
        }

        #[cfg(feature = "automaton")]
        if options.allow_automaton {
            if let Some(automaton) = build_automaton(patterns) {
                debug!("{} pattern(s) compiled to the literal automaton", patterns.len());
                return Ok(Self {
                    patterns: patterns.into(),
                    engine: CompiledEngine::Automaton(Arc::new(automaton)),
                });
            }
        }
        #[cfg(not(feature = "automaton"))]
        let _ = options;

        let matchers = patterns
            .iter()
            .map(build_regex)
            .collect::<Result<Vec<_>>>()?;
        debug!("{} pattern(s) compiled to the regex engine", patterns.len());
        Ok(Self {
            patterns: patterns.into(),
            engine: CompiledEngine::Regex(Arc::new(RegexPatterns {
                matchers,
                requirement: Requirement::new(patterns),
            })),
        })
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn engine(&self) -> MatcherEngine {
        match self.engine {
            #[cfg(feature = "automaton")]
            CompiledEngine::Automaton(_) => MatcherEngine::Automaton,
            CompiledEngine::Regex(_) => MatcherEngine::Regex,
        }
    }

    /// A matcher for one call site, with its own scratch memory
    pub fn create_matcher(&self) -> Matcher {
        match &self.engine {
            #[cfg(feature = "automaton")]
            CompiledEngine::Automaton(automaton) => Matcher::Automaton(AutomatonMatcher {
                fired: vec![false; automaton.requirement.is_exclude.len()],
                automaton: Arc::clone(automaton),
            }),
            CompiledEngine::Regex(patterns) => Matcher::Regex(RegexLineMatcher {
                patterns: Arc::clone(patterns),
            }),
        }
    }
}

/// Literal patterns the automaton can take, or `None`
///
/// ASCII case folding is all the automaton does, so a case-insensitive
/// literal qualifies only if Unicode folding would not add anything: it
/// must be ASCII and free of `k` and `s` (which fold with U+212A KELVIN
/// SIGN and U+017F LONG S).
#[cfg(feature = "automaton")]
fn build_automaton(patterns: &[Pattern]) -> Option<LiteralAutomaton> {
    let case_sensitive = patterns[0].case_sensitive;
    if patterns.iter().any(|p| p.case_sensitive != case_sensitive) {
        return None;
    }

    let literals = patterns
        .iter()
        .map(|p| p.literal_text())
        .collect::<Option<Vec<_>>>()?;

    if !case_sensitive
        && !literals.iter().all(|literal| {
            literal.is_ascii()
                && !literal
                    .bytes()
                    .any(|b| matches!(b.to_ascii_lowercase(), b'k' | b's'))
        })
    {
        return None;
    }

    let automaton = AhoCorasick::builder()
        .ascii_case_insensitive(!case_sensitive)
        .match_kind(MatchKind::Standard)
        .build(&literals)
        .map_err(|e| debug!("literal automaton rejected: {e}"))
        .ok()?;

    Some(LiteralAutomaton {
        automaton,
        requirement: Requirement::new(patterns),
    })
}

fn build_regex(pattern: &Pattern) -> Result<RegexMatcher> {
    RegexMatcherBuilder::new()
        .case_insensitive(!pattern.case_sensitive)
        .build(&pattern.pattern)
        .map_err(|e| LogscanError::invalid_pattern(&pattern.pattern, e.to_string()))
}

/// Line predicate for one call site
#[derive(Debug)]
pub enum Matcher {
    #[cfg(feature = "automaton")]
    Automaton(AutomatonMatcher),
    Regex(RegexLineMatcher),
}

impl Matcher {
    /// Does the line satisfy the expression? (inversion already applied)
    ///
    /// `line` should not include its terminator.
    pub fn has_match(&mut self, line: &[u8]) -> bool {
        match self {
            #[cfg(feature = "automaton")]
            Matcher::Automaton(matcher) => matcher.has_match(line),
            Matcher::Regex(matcher) => matcher.has_match(line),
        }
    }

    pub fn has_match_str(&mut self, line: &str) -> bool {
        self.has_match(line.as_bytes())
    }

    pub fn engine(&self) -> MatcherEngine {
        match self {
            #[cfg(feature = "automaton")]
            Matcher::Automaton(_) => MatcherEngine::Automaton,
            Matcher::Regex(_) => MatcherEngine::Regex,
        }
    }
}

/// Automaton matcher; `fired` is its scratch, one flag per sub-pattern
#[cfg(feature = "automaton")]
#[derive(Debug)]
pub struct AutomatonMatcher {
    automaton: Arc<LiteralAutomaton>,
    fired: Vec<bool>,
}

#[cfg(feature = "automaton")]
impl AutomatonMatcher {
    fn has_match(&mut self, line: &[u8]) -> bool {
        let requirement = &self.automaton.requirement;
        let stop_early = !requirement.has_excludes();
        self.fired.fill(false);

        let mut distinct_includes = 0;
        for found in self.automaton.automaton.find_overlapping_iter(line) {
            let id = found.pattern().as_usize();
            if std::mem::replace(&mut self.fired[id], true) {
                continue;
            }
            if requirement.is_exclude[id] {
                return false;
            }
            distinct_includes += 1;
            if stop_early && distinct_includes >= requirement.required_matches {
                return true;
            }
        }
        distinct_includes >= requirement.required_matches
    }
}

/// Regex matcher; the regex engine keeps no per-call-site scratch
#[derive(Debug)]
pub struct RegexLineMatcher {
    patterns: Arc<RegexPatterns>,
}

impl RegexLineMatcher {
    fn has_match(&self, line: &[u8]) -> bool {
        let requirement = &self.patterns.requirement;
        let mut distinct_includes = 0;
        for (matcher, &is_exclude) in self
            .patterns
            .matchers
            .iter()
            .zip(requirement.is_exclude.iter())
        {
            let fired = matches!(matcher.is_match(line), Ok(true));
            match (fired, is_exclude) {
                (true, true) => return false,
                (true, false) => distinct_includes += 1,
                (false, false) => return false,
                (false, true) => {}
            }
        }
        distinct_includes >= requirement.required_matches
    }
}
