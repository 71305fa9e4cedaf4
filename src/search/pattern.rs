//! Search pattern value type.

use std::fmt;

/// A pattern as typed by the user, plus its flags
///
/// Immutable once built; compile it with
/// [`CompiledExpression::compile`](crate::search::CompiledExpression::compile).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    /// Regular expression text
    pub pattern: String,
    pub case_sensitive: bool,
    /// A line matches when the expression does NOT occur in it
    pub is_exclude: bool,
}

impl Pattern {
    /// Case-sensitive, including pattern
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: true,
            is_exclude: false,
        }
    }

    pub fn with_flags(pattern: impl Into<String>, case_sensitive: bool, is_exclude: bool) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive,
            is_exclude,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    pub fn exclude(mut self) -> Self {
        self.is_exclude = true;
        self
    }

    /// The text this pattern matches literally, if it is a plain literal
    ///
    /// Escaped punctuation (`\.`, `\[`...) counts as literal; any other
    /// metacharacter or escape means the pattern needs a regex engine.
    /// Empty patterns are not literals.
    pub(crate) fn literal_text(&self) -> Option<String> {
        let mut literal = String::with_capacity(self.pattern.len());
        let mut chars = self.pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars.next()?;
                    // \< and \> are word boundaries, not literals
                    if escaped.is_ascii_punctuation() && escaped != '<' && escaped != '>' {
                        literal.push(escaped);
                    } else {
                        return None;
                    }
                }
                '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' => {
                    return None
                }
                _ => literal.push(c),
            }
        }
        (!literal.is_empty()).then_some(literal)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exclude {
            f.write_str("NOT ")?;
        }
        write!(f, "/{}/", self.pattern)?;
        if !self.case_sensitive {
            f.write_str("i")?;
        }
        Ok(())
    }
}
