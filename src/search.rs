//! Pattern matching over indexed lines.
//!
//! A [`Pattern`] is compiled once into a [`CompiledExpression`]; every
//! thread that matches lines takes its own [`Matcher`] from it.
//! [`FilteredLines`] runs an expression over the lines of a [`LineIndex`].
//!
//! [`LineIndex`]: crate::indexing::LineIndex

pub mod filter;
pub mod matcher;
pub mod pattern;

pub use filter::{search_lines, FilteredLines};
pub use matcher::{CompileOptions, CompiledExpression, Matcher, MatcherEngine};
pub use pattern::Pattern;
