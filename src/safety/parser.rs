//! SQL parsing for the read-only guard.
//!
//! Uses sqlparser-rs with a dialect matching the connection's backend.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use super::{StatementType, Verdict};
use crate::registry::BackendKind;

/// Parses SQL and decides whether it is read-only.
pub struct SqlGuard {
    dialect: Box<dyn Dialect + Send + Sync>,
}

impl Default for SqlGuard {
    fn default() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }
}

impl SqlGuard {
    /// Creates a guard using the dialect of `backend`.
    pub fn for_backend(backend: BackendKind) -> Self {
        let dialect: Box<dyn Dialect + Send + Sync> = match backend {
            BackendKind::Postgres => Box::new(PostgreSqlDialect {}),
            BackendKind::MySql => Box::new(MySqlDialect {}),
            BackendKind::Mongo => Box::new(GenericDialect {}),
        };
        Self { dialect }
    }

    /// Classifies a SQL string. Unparseable text is never read-only.
    pub fn check(&self, sql: &str) -> Verdict {
        let statements = match Parser::parse_sql(self.dialect.as_ref(), sql) {
            Ok(statements) => statements,
            Err(e) => {
                return Verdict {
                    statement_type: StatementType::Unparseable,
                    detail: Some(e.to_string()),
                }
            }
        };

        match statements.as_slice() {
            [] => Verdict {
                statement_type: StatementType::Unparseable,
                detail: Some("empty SQL statement".to_string()),
            },
            [single] => Verdict::new(classify_statement(single)),
            _ => Verdict::new(StatementType::Multiple),
        }
    }

    pub fn is_read_only(&self, sql: &str) -> bool {
        self.check(sql).is_read_only()
    }
}

/// Classifies SQL with the generic dialect.
pub fn classify_sql(sql: &str) -> Verdict {
    SqlGuard::default().check(sql)
}

fn classify_statement(statement: &Statement) -> StatementType {
    match statement {
        Statement::Query(query) => classify_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            // EXPLAIN ANALYZE runs the inner statement.
            if *analyze {
                match classify_statement(statement) {
                    StatementType::Select => StatementType::Explain,
                    other => other,
                }
            } else {
                StatementType::Explain
            }
        }
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. } => StatementType::Show,
        Statement::Insert(_) => StatementType::Write("INSERT".into()),
        Statement::Update { .. } => StatementType::Write("UPDATE".into()),
        Statement::Delete(_) => StatementType::Write("DELETE".into()),
        Statement::Drop { .. } => StatementType::Write("DROP".into()),
        Statement::Truncate { .. } => StatementType::Write("TRUNCATE".into()),
        Statement::AlterTable { .. } => StatementType::Write("ALTER".into()),
        Statement::CreateTable { .. } => StatementType::Write("CREATE".into()),
        Statement::Grant { .. } => StatementType::Write("GRANT".into()),
        _ => StatementType::Write("UNKNOWN".into()),
    }
}

/// Walks a query, including CTEs and derived tables, for embedded writes.
fn classify_query(query: &Query) -> StatementType {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let found = classify_query(&cte.query);
            if found != StatementType::Select {
                return found;
            }
        }
    }
    classify_set_expr(&query.body)
}

fn classify_set_expr(set_expr: &SetExpr) -> StatementType {
    match set_expr {
        SetExpr::Select(select) => classify_select(select),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::SetOperation { left, right, .. } => match classify_set_expr(left) {
            StatementType::Select => classify_set_expr(right),
            other => other,
        },
        SetExpr::Values(_) | SetExpr::Table(_) => StatementType::Select,
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => classify_statement(stmt),
        #[allow(unreachable_patterns)]
        _ => StatementType::Write("UNKNOWN".into()),
    }
}

fn classify_select(select: &Select) -> StatementType {
    select
        .from
        .iter()
        .map(classify_table_with_joins)
        .find(|t| *t != StatementType::Select)
        .unwrap_or(StatementType::Select)
}

fn classify_table_with_joins(twj: &TableWithJoins) -> StatementType {
    std::iter::once(&twj.relation)
        .chain(twj.joins.iter().map(|j| &j.relation))
        .map(classify_table_factor)
        .find(|t| *t != StatementType::Select)
        .unwrap_or(StatementType::Select)
}

fn classify_table_factor(factor: &TableFactor) -> StatementType {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => StatementType::Select,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_type(sql: &str, expected: StatementType) {
        let verdict = classify_sql(sql);
        assert_eq!(
            verdict.statement_type, expected,
            "SQL: '{}' - expected {:?}, got {:?}",
            sql, expected, verdict.statement_type
        );
    }

    #[test]
    fn test_select_is_read_only() {
        assert_type("SELECT * FROM sales", StatementType::Select);
        assert_type(
            "SELECT product, SUM(total_sales) FROM sales GROUP BY product ORDER BY 2 DESC LIMIT 5",
            StatementType::Select,
        );
    }

    #[test]
    fn test_cte_and_subquery_are_read_only() {
        assert_type(
            "WITH t AS (SELECT date, total_sales FROM sales) SELECT * FROM t",
            StatementType::Select,
        );
        assert_type(
            "SELECT * FROM (SELECT product FROM sales) AS s",
            StatementType::Select,
        );
        assert_type(
            "SELECT product FROM sales UNION SELECT product FROM returns",
            StatementType::Select,
        );
    }

    #[test]
    fn test_writes_are_rejected() {
        assert_type("DELETE FROM sales", StatementType::Write("DELETE".into()));
        assert_type(
            "UPDATE sales SET total_sales = 0",
            StatementType::Write("UPDATE".into()),
        );
        assert_type("DROP TABLE sales", StatementType::Write("DROP".into()));
        assert_type(
            "INSERT INTO sales VALUES ('2024-01-01', 'A', 1)",
            StatementType::Write("INSERT".into()),
        );
    }

    #[test]
    fn test_multiple_statements_rejected() {
        assert_type("SELECT 1; DROP TABLE sales", StatementType::Multiple);
    }

    #[test]
    fn test_garbage_is_unparseable() {
        let verdict = classify_sql("SELEC nonsense FROM");
        assert_eq!(verdict.statement_type, StatementType::Unparseable);
        assert!(verdict.detail.is_some());
        assert!(!verdict.is_read_only());
    }

    #[test]
    fn test_backend_dialects() {
        assert!(SqlGuard::for_backend(BackendKind::MySql).is_read_only("SELECT `product` FROM `sales`"));
        assert!(SqlGuard::for_backend(BackendKind::Postgres)
            .is_read_only("SELECT \"product\" FROM sales WHERE date >= NOW() - INTERVAL '30 days'"));
    }
}
