//! Command-line splitting.
//!
//! One input line holds an ordered sequence of pipeline stages separated by
//! unescaped `|` characters. Empty stages are preserved: a leading or
//! trailing separator produces an empty stage, and that emptiness is what
//! carries the pipeline-chain semantics into the dispatch engine.

/// Split one input line into pipeline stages on unescaped `|` separators.
///
/// `\|` escapes a literal pipe; the escape is removed from the stage text.
/// Always returns at least one element (an empty line yields `[""]`).
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                chars.next();
                current.push('|');
            }
            '|' => commands.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }

    commands.push(current);
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_yields_one_empty_command() {
        assert_eq!(split_command_line(""), vec![""]);
    }

    #[test]
    fn no_separator_yields_the_whole_line() {
        assert_eq!(split_command_line("hello"), vec!["hello"]);
    }

    #[test]
    fn unescaped_separator_splits() {
        assert_eq!(split_command_line("hello | there"), vec!["hello ", " there"]);
    }

    #[test]
    fn two_stage_pipeline() {
        assert_eq!(split_command_line("echo hi | cat"), vec!["echo hi ", " cat"]);
    }

    #[test]
    fn escaped_separator_is_literal() {
        assert_eq!(
            split_command_line(r"echo hi \| wc -c"),
            vec!["echo hi | wc -c"]
        );
    }

    #[test]
    fn trailing_separator_keeps_empty_stage() {
        assert_eq!(split_command_line("6|"), vec!["6", ""]);
    }

    #[test]
    fn leading_separator_keeps_empty_stage() {
        assert_eq!(split_command_line("| wc -l"), vec!["", " wc -l"]);
    }

    #[test]
    fn backslash_without_pipe_is_preserved() {
        assert_eq!(split_command_line(r"echo a\b"), vec![r"echo a\b"]);
    }

    #[test]
    fn adjacent_separators_keep_the_empty_middle_stage() {
        assert_eq!(split_command_line("a||b"), vec!["a", "", "b"]);
    }
}
