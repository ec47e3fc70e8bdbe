//! The implicit current value threaded between pipeline stages.

use std::fmt;

/// The current value register of a pipeline session.
///
/// Plays the role a byte stream plays in a traditional shell pipe, but typed.
/// Each producer picks the variant: expression results map from the embedded
/// language, captured process output becomes a line sequence, captured print
/// output becomes text (or lines, when it spans more than one line).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No current value.
    #[default]
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A textual blob.
    Text(String),
    /// An ordered sequence of text lines.
    Lines(Vec<String>),
}

impl Value {
    /// True when no value is held.
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Render the value as piped input for an external process.
    ///
    /// Returns `None` when there is nothing to pipe. Line sequences are
    /// newline-joined; everything else uses its textual form. The result
    /// always carries a single trailing newline, the way a well-behaved
    /// upstream command would end its output.
    pub fn render_piped(&self) -> Option<String> {
        let mut text = match self {
            Value::Absent => return None,
            Value::Lines(lines) => lines.join("\n"),
            Value::Text(s) => s.clone(),
            other => other.to_string(),
        };
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Some(text)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Lines(lines) => write!(f, "{}", lines.join("\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_absent() {
        assert!(Value::default().is_absent());
        assert!(!Value::Int(0).is_absent());
    }

    #[test]
    fn piped_absent_is_none() {
        assert_eq!(Value::Absent.render_piped(), None);
    }

    #[test]
    fn piped_text_gets_one_trailing_newline() {
        assert_eq!(Value::Text("hi".into()).render_piped().unwrap(), "hi\n");
        assert_eq!(Value::Text("hi\n".into()).render_piped().unwrap(), "hi\n");
    }

    #[test]
    fn piped_lines_are_joined() {
        let value = Value::Lines(vec!["a".into(), "b".into()]);
        assert_eq!(value.render_piped().unwrap(), "a\nb\n");
    }

    #[test]
    fn piped_scalar_uses_display() {
        assert_eq!(Value::Int(6).render_piped().unwrap(), "6\n");
        assert_eq!(Value::Bool(true).render_piped().unwrap(), "true\n");
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Absent.to_string(), "nil");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::Text("x".into()).to_string(), "x");
        assert_eq!(
            Value::Lines(vec!["a".into(), "b".into()]).to_string(),
            "a\nb"
        );
    }
}
