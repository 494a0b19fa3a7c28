use crate::error::{AskDbError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static READ_ONLY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A\s*(?:select|with)\b").unwrap()
});

static FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```\s*\z").unwrap()
});

// tolerates escaped quotes inside the value and raw newlines that break
// strict json
static SQL_FIELD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)"sql"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap()
});

/// why a single decode strategy gave up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("response is not valid json: {0}")]
    NotJson(String),

    #[error("response has no string field 'sql'")]
    MissingSqlField,

    #[error("no \"sql\": \"...\" pattern found in response")]
    NoSqlPattern,

    #[error("only SELECT/WITH statements are allowed, got: {0}")]
    NotReadOnly(String),
}

/// true when the statement starts with SELECT or WITH (any case)
pub fn is_select_or_with(sql: &str) -> bool {
    READ_ONLY_REGEX.is_match(sql)
}

/// strips one enclosing markdown fence (```json, ```sql, ...) if present
pub fn strip_code_fences(text: &str) -> &str {
    FENCE_REGEX
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

fn require_read_only(sql: String) -> std::result::Result<String, DecodeError> {
    if is_select_or_with(&sql) {
        Ok(sql)
    } else {
        Err(DecodeError::NotReadOnly(preview(&sql)))
    }
}

fn preview(sql: &str) -> String {
    const MAX: usize = 80;
    if sql.chars().count() <= MAX {
        sql.to_string()
    } else {
        let head: String = sql.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

/// primary strategy: the content is a json object with a string `sql` field
pub fn decode_strict(content: &str) -> std::result::Result<String, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| DecodeError::NotJson(e.to_string()))?;

    let sql = value
        .get("sql")
        .and_then(|v| v.as_str())
        .ok_or(DecodeError::MissingSqlField)?;

    require_read_only(sql.trim().to_string())
}

/// salvage strategy for near-miss json: pull the first `"sql": "..."` value
/// out of the raw text and unescape it
pub fn decode_fallback(content: &str) -> std::result::Result<String, DecodeError> {
    let raw = SQL_FIELD_REGEX
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or(DecodeError::NoSqlPattern)?;

    require_read_only(unescape_json_string(raw).trim().to_string())
}

/// runs the strict decode, then the salvage decode; both failing is a
/// terminal model error for the attempt
pub fn extract_sql(content: &str) -> Result<String> {
    let text = strip_code_fences(content).trim();

    if text.is_empty() {
        return Err(AskDbError::Model("model returned empty output".to_string()));
    }

    let strict_err = match decode_strict(text) {
        Ok(sql) => return Ok(sql),
        Err(e) => e,
    };

    tracing::debug!(error = %strict_err, "strict decode failed, trying pattern salvage");

    decode_fallback(text).map_err(|fallback_err| {
        AskDbError::Model(format!(
            "could not extract a valid sql statement from model output ({}; {})",
            strict_err, fallback_err
        ))
    })
}

fn unescape_json_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            // \" \\ \/ and anything unknown keep the escaped char
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}
