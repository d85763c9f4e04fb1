// /////////////////////////////////////////////////////////////////////////////
// Sentinel DLP
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQL Text Helpers
//!
//! Best-effort lexical analysis shared by the MySQL and PostgreSQL parsers:
//! statement type and referenced table list. This is not a SQL parser -
//! subqueries, CTEs, and quoting edge cases degrade to partial results,
//! which is the contracted behavior.

/// Uppercased first keyword of the statement ("SELECT", "INSERT", ...).
pub(crate) fn statement_type(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(|word| word.to_ascii_uppercase())
        .unwrap_or_default()
}

/// Best-effort list of referenced tables, deduplicated in encounter order.
///
/// Scans for the identifier following FROM / JOIN / INTO / UPDATE / TABLE
/// keywords and strips quoting and trailing punctuation.
pub(crate) fn extract_tables(sql: &str) -> Vec<String> {
    let mut tables = Vec::new();
    let tokens: Vec<&str> = sql.split_whitespace().collect();
    for window in tokens.windows(2) {
        let keyword = window[0].to_ascii_uppercase();
        if matches!(keyword.as_str(), "FROM" | "JOIN" | "INTO" | "UPDATE" | "TABLE") {
            let raw = window[1]
                .trim_matches(['`', '"', '\'', '(', ')', ',', ';'])
                .to_string();
            if raw.is_empty() || raw.to_ascii_uppercase() == "SELECT" {
                continue;
            }
            if !tables.contains(&raw) {
                tables.push(raw);
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_type() {
        assert_eq!(statement_type("select * from users"), "SELECT");
        assert_eq!(statement_type("  UPDATE accounts SET x=1"), "UPDATE");
        assert_eq!(statement_type(""), "");
    }

    #[test]
    fn test_table_extraction() {
        assert_eq!(
            extract_tables("SELECT a FROM users JOIN orders ON users.id = orders.uid"),
            ["users", "orders"]
        );
        assert_eq!(extract_tables("INSERT INTO `audit_log` VALUES (1)"), ["audit_log"]);
        assert_eq!(extract_tables("UPDATE accounts SET balance = 0"), ["accounts"]);
    }

    #[test]
    fn test_subquery_degrades_gracefully() {
        let tables = extract_tables("SELECT * FROM (SELECT id FROM inner_t) x");
        // The inner table is found; the parenthesized subquery head is not a
        // table.
        assert!(tables.contains(&"inner_t".to_string()));
    }
}
