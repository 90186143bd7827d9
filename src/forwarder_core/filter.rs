use regex::Regex;

/// Ordered set of regex filters applied to a record's text.
///
/// An empty set lets everything through.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    patterns: Vec<Regex>,
}

impl FilterSet {
    pub fn compile<S: AsRef<str>>(expressions: &[S]) -> Result<Self, regex::Error> {
        let patterns = expressions
            .iter()
            .map(|expr| Regex::new(expr.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Number of times a record should be emitted: once per matching pattern,
    /// or exactly once when there are no patterns.
    pub fn match_count(&self, text: &str) -> usize {
        if self.patterns.is_empty() {
            return 1;
        }
        self.patterns.iter().filter(|re| re.is_match(text)).count()
    }
}
