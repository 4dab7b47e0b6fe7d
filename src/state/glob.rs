use std::fmt;

use regex::Regex;

use crate::error::ConfigError;

/// A state-name glob.
///
/// `*` matches exactly one name segment, `**` matches any number of segments
/// (including none). `home.*` matches `home.list` but not `home` or
/// `home.list.item`; `home.**` matches all three.
#[derive(Clone)]
pub struct Glob {
    text: String,
    regex: Regex,
}

impl Glob {
    pub fn new(text: &str) -> Result<Glob, ConfigError> {
        let source: String = text
            .split('.')
            .map(|segment| match segment {
                "**" => r"(?:|(?:\.[^.]*)*)".to_string(),
                "*" => r"\.[^.]*".to_string(),
                literal => format!(r"\.{}", regex::escape(literal)),
            })
            .collect();

        let regex = Regex::new(&format!("^{source}$"))
            .map_err(|e| ConfigError::InvalidPattern { pattern: text.to_string(), reason: e.to_string() })?;
        Ok(Glob { text: text.to_string(), regex })
    }

    pub fn is_glob(text: &str) -> bool {
        text.contains('*')
    }

    pub fn matches(&self, state_name: &str) -> bool {
        self.regex.is_match(&format!(".{state_name}"))
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Glob({})", self.text)
    }
}
