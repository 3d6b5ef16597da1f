//! Parsers for the control-statement grammar:
//!
//! ```sql
//! ADD JAR '<path>' ['<path>' ...]
//! ADD CUSTOMJAR '<path>'
//! ADD FILE '<path>'
//! EXECUTE JAR WITH ('uri'='<jar>', 'main-class'='<class>', 'args'='<args>')
//! EXECUTE JAR(<mainClass>, <arg>, ...)
//! ```

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::error::{SubmitError, SubmitResult};

static ADD_JAR_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*add\s+(?:customjar|jar)\s+(.+?)\s*$").expect("Invalid regex pattern")
});
static ADD_FILE_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*add\s+file\s+(.+?)\s*$").expect("Invalid regex pattern"));
static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'([^']*)'|"([^"]*)"|([^\s,'"]+)"#).expect("Invalid regex pattern")
});
static EXECUTE_JAR_WITH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*execute\s+jar\s+with\s*\((.*)\)\s*$").expect("Invalid regex pattern")
});
static EXECUTE_JAR_POSITIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*execute\s+jar\s*\((.*)\)\s*$").expect("Invalid regex pattern")
});
static OPTION_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'([^']*)'\s*=\s*'([^']*)'").expect("Invalid regex pattern")
});
static ARG_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s*(?:'([^']*)'|"([^"]*)"|([^,]+))"#).expect("Invalid regex pattern")
});

/// An external program descriptor parsed from `EXECUTE JAR`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JarProgram {
    /// Program jar. `None` means the entry point is looked up on the classpath
    /// staged by earlier `ADD JAR` statements.
    pub uri: Option<String>,
    /// Entry point; `None` defers to the jar manifest.
    pub main_class: Option<String>,
    pub args: Vec<String>,
    /// Skip savepoint state that cannot be mapped to the new program.
    pub allow_non_restored_state: bool,
}

/// Paths referenced by `ADD JAR` / `ADD CUSTOMJAR`.
pub fn parse_add_jar(text: &str) -> SubmitResult<Vec<String>> {
    parse_paths(&ADD_JAR_ARGS, text, "ADD JAR")
}

/// Paths referenced by `ADD FILE`.
pub fn parse_add_file(text: &str) -> SubmitResult<Vec<String>> {
    parse_paths(&ADD_FILE_ARGS, text, "ADD FILE")
}

fn parse_paths(pattern: &Regex, text: &str, directive: &str) -> SubmitResult<Vec<String>> {
    let args = pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .ok_or_else(|| SubmitError::statement(format!("not an {} statement: {}", directive, text)))?;

    let paths = capture_tokens(&PATH_TOKEN, args.as_str());
    if paths.is_empty() {
        return Err(SubmitError::statement(format!(
            "{} requires at least one path: {}",
            directive, text
        )));
    }
    Ok(paths)
}

/// Parse either `EXECUTE JAR` form into a program descriptor.
pub fn parse_execute_jar(text: &str) -> SubmitResult<JarProgram> {
    if let Some(options) = EXECUTE_JAR_WITH.captures(text).and_then(|c| c.get(1)) {
        return parse_with_options(options.as_str());
    }
    if let Some(list) = EXECUTE_JAR_POSITIONAL.captures(text).and_then(|c| c.get(1)) {
        return parse_positional(list.as_str());
    }
    Err(SubmitError::statement(format!(
        "malformed EXECUTE JAR statement: {}",
        text
    )))
}

fn parse_with_options(options: &str) -> SubmitResult<JarProgram> {
    let mut program = JarProgram::default();

    for pair in OPTION_PAIR.captures_iter(options) {
        let value = pair[2].trim();
        match pair[1].trim().to_ascii_lowercase().as_str() {
            "uri" => program.uri = non_blank(value),
            "main-class" => program.main_class = non_blank(value),
            "args" => {
                program.args = shell_words::split(value).map_err(|e| {
                    SubmitError::statement(format!("invalid EXECUTE JAR args `{}`: {}", value, e))
                })?
            }
            "allownonrestoredstate" | "allow-non-restored-state" => {
                program.allow_non_restored_state = value.eq_ignore_ascii_case("true")
            }
            other => tracing::debug!("Ignoring EXECUTE JAR option `{}`", other),
        }
    }

    if program.uri.is_none() {
        return Err(SubmitError::statement(
            "EXECUTE JAR WITH (...) requires a 'uri' option",
        ));
    }
    Ok(program)
}

fn parse_positional(list: &str) -> SubmitResult<JarProgram> {
    let mut items = capture_tokens(&ARG_TOKEN, list).into_iter();
    let main_class = items
        .next()
        .ok_or_else(|| SubmitError::statement("EXECUTE JAR(...) requires a main class"))?;

    Ok(JarProgram {
        uri: None,
        main_class: Some(main_class),
        args: items.collect(),
        allow_non_restored_state: false,
    })
}

fn capture_tokens(pattern: &Regex, input: &str) -> Vec<String> {
    pattern
        .captures_iter(input)
        .filter_map(|c: Captures<'_>| {
            c.get(1)
                .or_else(|| c.get(2))
                .or_else(|| c.get(3))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|token| !token.is_empty())
        .collect()
}

fn non_blank(value: &str) -> Option<String> {
    Some(value.to_string()).filter(|v| !v.is_empty())
}
