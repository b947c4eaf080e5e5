//! Line-level secret redaction and tail truncation of captured output.

use regex::Regex;

use geoasset_shared::{GeoAssetError, RedactPattern, Result};

/// One redaction rule. A matching line is replaced wholesale.
#[derive(Debug, Clone)]
pub enum RedactionRule {
    /// Lines starting with `NAME=` become `NAME=***`.
    Variable { name: String },
    /// Lines where `regex` matches at the start become `replacement`.
    Pattern { regex: Regex, replacement: String },
}

impl RedactionRule {
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable { name: name.into() }
    }

    /// Compile a pattern rule. The regex is only honoured at line start.
    pub fn pattern(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| GeoAssetError::config(format!("invalid redaction pattern '{pattern}': {e}")))?;
        Ok(Self::Pattern {
            regex,
            replacement: replacement.into(),
        })
    }

    /// Replacement for `line`, or `None` when the rule does not apply.
    fn apply(&self, line: &str) -> Option<String> {
        match self {
            Self::Variable { name } => {
                let rest = line.strip_prefix(name.as_str())?;
                rest.starts_with('=').then(|| format!("{name}=***"))
            }
            Self::Pattern { regex, replacement } => regex
                .find(line)
                .filter(|m| m.start() == 0)
                .map(|_| replacement.clone()),
        }
    }
}

/// Ordered rule list applied line by line; the first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    rules: Vec<RedactionRule>,
}

impl Redactor {
    pub fn new(rules: Vec<RedactionRule>) -> Self {
        Self { rules }
    }

    /// Build from configured variable names followed by pattern entries.
    pub fn from_config(variables: &[String], patterns: &[RedactPattern]) -> Result<Self> {
        let mut rules: Vec<RedactionRule> =
            variables.iter().map(RedactionRule::variable).collect();
        for entry in patterns {
            rules.push(RedactionRule::pattern(&entry.pattern, entry.replacement.clone())?);
        }
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[RedactionRule] {
        &self.rules
    }

    /// Redact `text`, keeping line terminators intact.
    pub fn redact(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for segment in text.split_inclusive('\n') {
            let (line, ending) = split_line_ending(segment);
            match self.rules.iter().find_map(|rule| rule.apply(line)) {
                Some(replacement) => out.push_str(&replacement),
                None => out.push_str(line),
            }
            out.push_str(ending);
        }
        out
    }
}

fn split_line_ending(segment: &str) -> (&str, &str) {
    let body_len = segment.trim_end_matches(['\n', '\r']).len();
    segment.split_at(body_len)
}

/// Keep the last `limit` bytes of `text`, moving forward to a char boundary.
pub fn truncate_tail(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
