//! What one dispatched command reports back to its caller.

/// The outcome of dispatching a single pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// True when the engine is owed a continuation line — the input so far is
    /// a syntactically valid prefix of a larger statement.
    pub incomplete: bool,
    /// True when the caller should render the current value after this stage.
    pub should_print: bool,
}
