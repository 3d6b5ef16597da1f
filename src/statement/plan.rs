//! Ordered statement plan for a SQL program.
//!
//! A plan is built once from the split source. Finalization expands SQL
//! fragments and groups INSERT statements into a statement set when the task
//! asks for it; the result is what the pipeline executor dispatches.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use tracing::debug;

use super::classifier::{classify, StatementKind};

static FRAGMENT_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*([A-Za-z_][\w.]*)\s*:=\s*(.*)$").expect("Invalid regex pattern")
});
static FRAGMENT_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][\w.]*)\}").expect("Invalid regex pattern"));
static INSERT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*insert\s+").expect("Invalid regex pattern"));

/// A classified statement as it appears in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 1-based position in the source.
    pub ordinal: usize,
    pub text: String,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executable {
    Sql(String),
    /// INSERT statements submitted together as one job.
    StatementSet(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStatement {
    pub ordinal: usize,
    pub kind: StatementKind,
    pub executable: Executable,
}

impl PlannedStatement {
    /// Text used when reporting this entry.
    pub fn display_text(&self) -> String {
        match &self.executable {
            Executable::Sql(text) => text.clone(),
            Executable::StatementSet(inserts) => inserts.join(";\n"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanOptions<'a> {
    pub use_fragments: bool,
    pub use_statement_set: bool,
    /// Global variables consulted after fragments when expanding `${name}`.
    pub globals: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct StatementPlan {
    statements: Vec<Statement>,
    executable: Vec<PlannedStatement>,
}

impl StatementPlan {
    pub fn build(texts: Vec<String>, options: &PlanOptions<'_>) -> Self {
        let statements: Vec<Statement> = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Statement {
                ordinal: i + 1,
                kind: classify(&text),
                text,
            })
            .collect();

        let mut planned: Vec<PlannedStatement> = if options.use_fragments {
            expand_fragments(&statements, options.globals)
        } else {
            statements
                .iter()
                .map(|s| PlannedStatement {
                    ordinal: s.ordinal,
                    kind: s.kind,
                    executable: Executable::Sql(s.text.clone()),
                })
                .collect()
        };

        if options.use_statement_set {
            planned = group_inserts(planned);
        }

        debug!(
            "Planned {} of {} source statements",
            planned.len(),
            statements.len()
        );

        Self {
            statements,
            executable: planned,
        }
    }

    /// Source statements, before finalization.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Finalized entries, in dispatch order.
    pub fn executable(&self) -> &[PlannedStatement] {
        &self.executable
    }
}

fn expand_fragments(
    statements: &[Statement],
    globals: &BTreeMap<String, String>,
) -> Vec<PlannedStatement> {
    let mut fragments: HashMap<String, String> = HashMap::new();
    let mut planned = Vec::with_capacity(statements.len());

    for statement in statements {
        if let Some(def) = FRAGMENT_DEFINITION.captures(&statement.text) {
            let value = substitute(def[2].trim(), &fragments, globals);
            debug!("Defined SQL fragment `{}`", &def[1]);
            fragments.insert(def[1].to_string(), value);
            continue;
        }

        let text = substitute(&statement.text, &fragments, globals);
        planned.push(PlannedStatement {
            ordinal: statement.ordinal,
            kind: classify(&text),
            executable: Executable::Sql(text),
        });
    }

    planned
}

fn substitute(
    text: &str,
    fragments: &HashMap<String, String>,
    globals: &BTreeMap<String, String>,
) -> String {
    FRAGMENT_REFERENCE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            fragments
                .get(name)
                .or_else(|| globals.get(name))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn group_inserts(planned: Vec<PlannedStatement>) -> Vec<PlannedStatement> {
    let is_insert = |p: &PlannedStatement| {
        p.kind == StatementKind::Standard
            && matches!(&p.executable, Executable::Sql(text) if INSERT_PATTERN.is_match(text))
    };

    let Some(last_insert) = planned.iter().rposition(is_insert) else {
        return planned;
    };
    let ordinal = planned[last_insert].ordinal;

    let mut inserts = Vec::new();
    let mut grouped = Vec::with_capacity(planned.len());
    for (index, entry) in planned.into_iter().enumerate() {
        if is_insert(&entry) {
            if let Executable::Sql(text) = entry.executable {
                inserts.push(text);
            }
        } else {
            grouped.push(entry);
            continue;
        }

        if index == last_insert {
            grouped.push(PlannedStatement {
                ordinal,
                kind: StatementKind::Standard,
                executable: Executable::StatementSet(std::mem::take(&mut inserts)),
            });
        }
    }

    grouped
}
