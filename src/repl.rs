use rustyline::completion::{Completer, Pair};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Context, Helper, Highlighter, Hinter, Result};

use crate::lang::command::command_names;
use crate::lang::functions::BUILTINS;

/// Helper that extends editor
///
/// Completes command names after `!` and builtin names everywhere else, and triggers multiline
/// editing when a `\` is seen at the end of a line.
#[derive(Helper, Highlighter, Hinter)]
pub struct ReplHelper {}

impl ReplHelper {
    pub fn new() -> Self {
        ReplHelper {}
    }
}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Result<(usize, Vec<Pair>)> {
        let (start, names) = completions(line, pos);
        let candidates = names
            .into_iter()
            .map(|n| Pair {
                display: n.to_string(),
                replacement: n.to_string(),
            })
            .collect();

        Ok((start, candidates))
    }
}

impl Validator for ReplHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> Result<ValidationResult> {
        if ctx.input().ends_with('\\') {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

/// Start of the word under the cursor and every name it could complete to
fn completions(line: &str, pos: usize) -> (usize, Vec<&'static str>) {
    let start = line[..pos]
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric())
        .last()
        .map_or(pos, |(i, _)| i);
    let word = &line[start..pos];
    let before = line[..start].trim();

    let names: Vec<&'static str> = if before == "!" || before.starts_with("!help") {
        command_names().collect()
    } else if before.starts_with('!') && !before.starts_with("!import") {
        // Other commands take names from the environment, which the editor cannot see
        Vec::new()
    } else {
        BUILTINS.iter().map(|b| b.name()).collect()
    };

    (
        start,
        names.into_iter().filter(|n| n.starts_with(word)).collect(),
    )
}

/// Remove the multiline escapes created by `ReplHelper`
pub fn join_lines(input: &str) -> String {
    input.replace("\\\n", " ")
}

#[test]
fn test_completions() {
    assert_eq!(completions("!im", 3), (1, vec!["import"]));
    assert_eq!(completions("! d", 3), (2, vec!["def", "del"]));
    assert_eq!(completions("!help q", 7), (6, vec!["quit"]));
    assert_eq!(completions("!import sq", 10), (8, vec!["sqrt2", "sqrt"]));
    assert_eq!(completions("1 + as", 6), (4, vec!["asin"]));
    assert_eq!(completions("ga(1) + x", 2), (0, vec!["gamma"]));
    assert_eq!(completions("!del x", 6), (5, vec![]));
}

#[test]
fn test_join_lines() {
    assert_eq!(join_lines("1 + \\\n2"), "1 +  2");
    assert_eq!(join_lines("1 + \\ \n2"), "1 + \\ \n2");
    assert_eq!(join_lines("1 + 2"), "1 + 2");
}
