//! Human-readable score explanations.

use std::fmt;

use serde::Serialize;

/// Tree describing how a score was computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    /// Value contributed by this node.
    pub value: f32,
    /// What the value is.
    pub description: String,
    /// Sub-computations the value was derived from.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Explanation>,
}

impl Explanation {
    /// A leaf node.
    pub fn new<S: Into<String>>(value: f32, description: S) -> Self {
        Explanation {
            value,
            description: description.into(),
            details: Vec::new(),
        }
    }

    /// Attach a sub-computation.
    pub fn with_detail(mut self, detail: Explanation) -> Self {
        self.details.push(detail);
        self
    }

    /// Attach several sub-computations.
    pub fn with_details<I: IntoIterator<Item = Explanation>>(mut self, details: I) -> Self {
        self.details.extend(details);
        self
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{} = {}", "", self.value, self.description, indent = depth * 2)?;
        for detail in &self.details {
            detail.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
