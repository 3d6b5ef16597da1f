use crate::db::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Launch a single external program via `EXECUTE JAR`.
    Jar,
    /// Run the SQL statements in order.
    Pipeline,
}

impl ExecutionMode {
    pub fn select(dialect: Dialect) -> Self {
        match dialect {
            Dialect::FlinkJar => Self::Jar,
            Dialect::FlinkSql => Self::Pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_follows_dialect() {
        assert_eq!(ExecutionMode::select(Dialect::FlinkJar), ExecutionMode::Jar);
        assert_eq!(ExecutionMode::select(Dialect::FlinkSql), ExecutionMode::Pipeline);
    }
}
