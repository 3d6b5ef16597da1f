pub mod classifier;
pub mod parser;
pub mod plan;
pub mod splitter;

pub use classifier::{classify, StatementKind};
pub use parser::{parse_add_file, parse_add_jar, parse_execute_jar, JarProgram};
pub use plan::{Executable, PlanOptions, PlannedStatement, Statement, StatementPlan};
pub use splitter::split_statements;
