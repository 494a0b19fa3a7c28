use crate::agent::parser::is_select_or_with;
use crate::error::{AskDbError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\A\s*```(?:sql)?\s*(.*?)\s*```\s*\z").unwrap()
});

static TRAILING_TERMINATOR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:;\s*)+\z").unwrap()
});

// `), SELECT` and `),\n  SELECT` after the last cte
static CTE_TRAILING_COMMA_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\)\s*,\s*(select\b)").unwrap()
});

static EMPTY_WITH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A\s*with\s*,\s*(select\b)").unwrap()
});

// a cte body that writes: `AS (DELETE ...`, `AS MATERIALIZED (UPDATE ...`
static WRITING_CTE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bas\s*(?:not\s+)?(?:materialized\s*)?\(\s*(?:insert|update|delete|merge)\b").unwrap()
});

static LIMIT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\blimit\b").unwrap()
});

/// deterministic textual repair of model sql. idempotent; the result is
/// SELECT/WITH-rooted, has no trailing `;` and mentions LIMIT somewhere.
///
/// the LIMIT check is textual: a LIMIT inside a subquery, literal or comment
/// suppresses the appended outer limit.
pub fn normalize(sql: &str, limit: u32) -> Result<String> {
    let sql = TRAILING_TERMINATOR_REGEX.replace(sql.trim(), "");
    let sql = FENCE_REGEX.replace(&sql, "$1");
    let sql = TRAILING_TERMINATOR_REGEX.replace(sql.trim(), "");
    let sql = CTE_TRAILING_COMMA_REGEX.replace_all(&sql, ") $1");
    let sql = EMPTY_WITH_REGEX.replace(&sql, "$1");
    let sql = sql.trim();

    if !is_select_or_with(sql) {
        return Err(AskDbError::Validation(
            "only SELECT/WITH statements are allowed".to_string(),
        ));
    }
    if WRITING_CTE_REGEX.is_match(sql) {
        return Err(AskDbError::Validation(
            "data-modifying statements inside WITH are not allowed".to_string(),
        ));
    }

    if LIMIT_REGEX.is_match(sql) {
        Ok(sql.to_string())
    } else if ends_in_line_comment(sql) {
        Ok(format!("{}\nLIMIT {}", sql, limit))
    } else {
        Ok(format!("{} LIMIT {}", sql, limit))
    }
}

// a `--` comment on the last line would swallow an appended clause
fn ends_in_line_comment(sql: &str) -> bool {
    sql.lines().last().is_some_and(|line| line.contains("--"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_normal_form(sql: &str) {
        let upper = sql.to_uppercase();
        assert!(!sql.is_empty());
        assert!(upper.starts_with("SELECT") || upper.starts_with("WITH"));
        assert!(!sql.trim_end().ends_with(';'));
        assert!(upper.contains("LIMIT"));
    }

    #[test]
    fn test_appends_limit() {
        assert_eq!(normalize("SELECT 1", 100).unwrap(), "SELECT 1 LIMIT 100");
    }

    #[test]
    fn test_removes_errant_cte_comma() {
        let sql = normalize("WITH a AS (SELECT 1), SELECT * FROM a", 100).unwrap();
        assert_eq!(sql, "WITH a AS (SELECT 1) SELECT * FROM a LIMIT 100");
    }

    #[test]
    fn test_removes_line_broken_cte_comma() {
        let input = "WITH a AS (SELECT 1),\n  b AS (SELECT 2),\nselect * FROM a, b";
        let sql = normalize(input, 10).unwrap();
        assert_eq!(
            sql,
            "WITH a AS (SELECT 1),\n  b AS (SELECT 2) select * FROM a, b LIMIT 10"
        );
    }

    #[test]
    fn test_empty_with_becomes_select() {
        let sql = normalize("WITH , SELECT id FROM t", 5).unwrap();
        assert_eq!(sql, "SELECT id FROM t LIMIT 5");
    }

    #[test]
    fn test_strips_fence_and_terminators() {
        let sql = normalize("```sql\nSELECT id FROM t LIMIT 3;\n```", 100).unwrap();
        assert_eq!(sql, "SELECT id FROM t LIMIT 3");

        let sql = normalize("SELECT 1;; \n", 100).unwrap();
        assert_eq!(sql, "SELECT 1 LIMIT 100");

        let sql = normalize("```\nSELECT 1\n```;", 100).unwrap();
        assert_eq!(sql, "SELECT 1 LIMIT 100");
    }

    #[test]
    fn test_limit_goes_below_trailing_line_comment() {
        let sql = normalize("SELECT id FROM t -- every user", 100).unwrap();
        assert_eq!(sql, "SELECT id FROM t -- every user\nLIMIT 100");

        let sql = normalize("SELECT id -- the key\nFROM t", 100).unwrap();
        assert_eq!(sql, "SELECT id -- the key\nFROM t LIMIT 100");
    }

    #[test]
    fn test_rejects_writing_cte() {
        let inputs = [
            "WITH d AS (DELETE FROM users RETURNING id) SELECT id FROM d",
            "with u as materialized ( update t set x = 1 returning x ) select x from u",
            "WITH a AS (SELECT 1), i AS (INSERT INTO t VALUES (1) RETURNING 1) SELECT * FROM i",
        ];

        for input in inputs {
            assert!(
                matches!(normalize(input, 10), Err(AskDbError::Validation(_))),
                "accepted {:?}",
                input
            );
        }

        let sql = normalize("WITH updates AS (SELECT updated_at FROM t) SELECT * FROM updates", 10).unwrap();
        assert!(sql.ends_with("LIMIT 10"));
    }

    #[test]
    fn test_existing_limit_kept() {
        let sql = normalize("select id from t limit 7", 100).unwrap();
        assert_eq!(sql, "select id from t limit 7");
    }

    #[test]
    fn test_limit_in_subquery_suppresses_append() {
        // textual check by design of the contract
        let sql = normalize("SELECT * FROM (SELECT id FROM t LIMIT 5) s", 100).unwrap();
        assert!(!sql.ends_with("LIMIT 100"));
    }

    #[test]
    fn test_rejects_non_select() {
        assert!(matches!(
            normalize("DELETE FROM users", 100),
            Err(AskDbError::Validation(_))
        ));
        assert!(normalize("", 100).is_err());
        assert!(normalize("```sql\nDROP TABLE t;\n```", 100).is_err());
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "SELECT 1",
            "SELECT 1;",
            "SELECT 1;;",
            "with a as (select 1), select * from a;",
            "WITH a AS (SELECT 1),\nSELECT * FROM a",
            "WITH , SELECT 2",
            "```sql\nSELECT x FROM y\n```",
            "  SELECT id FROM t LIMIT 4 ;  ",
            "SELECT '```' AS fence",
            "```\nSELECT 1\n```;",
            "SELECT id FROM t -- every user",
        ];

        for input in inputs {
            let once = normalize(input, 100).unwrap();
            let twice = normalize(&once, 100).unwrap();
            assert_eq!(once, twice, "not idempotent for {:?}", input);
            assert_normal_form(&once);
        }
    }
}
