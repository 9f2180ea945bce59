/// Sanitizer for user-supplied calculation expressions
///
/// This is the only injection defense for calculation text and must run before
/// any macro substitution or parsing. Everything inside single-quoted literals is
/// ignored; outside of literals statement separators, comments, non-SQL quoting
/// and DML/DDL keywords are rejected.
use crate::error::{CalcError, Result};

/// Keywords that are never valid in a calculation expression
const UNSAFE_KEYWORDS: &[&str] = &[
    "DELETE", "INSERT", "UPDATE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "MERGE", "EXEC", "EXECUTE", "CALL", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REPLACE",
    "COMMIT", "ROLLBACK",
];

/// Replace line breaks by spaces
pub fn clean(expr: &str) -> String {
    expr.chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

/// Fail with `UnsafeExpression` if the expression is not safe to embed into SQL
pub fn reject_if_unsafe(expr: &str) -> Result<()> {
    let unquoted = mask_literals(expr)?;

    for (pattern, what) in [
        (";", "statement separator ;"),
        ("--", "comment --"),
        ("/*", "comment /*"),
        ("*/", "comment */"),
        ("\"", "double quote"),
        ("\\", "backslash"),
    ] {
        if unquoted.contains(pattern) {
            return Err(CalcError::UnsafeExpression(what.to_string()));
        }
    }

    for word in unquoted.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
        if word.is_empty() {
            continue;
        }
        let upper = word.to_ascii_uppercase();
        if UNSAFE_KEYWORDS.contains(&upper.as_str()) {
            return Err(CalcError::UnsafeExpression(format!("keyword {}", upper)));
        }
    }
    Ok(())
}

/// Replace each single-quoted literal, quotes included, by one space.
/// A doubled quote inside a literal is an escaped quote.
fn mask_literals(expr: &str) -> Result<String> {
    let mut out = String::with_capacity(expr.len());
    let mut chars = expr.chars().peekable();
    let mut in_quote = false;

    while let Some(c) = chars.next() {
        if !in_quote {
            if c == '\'' {
                in_quote = true;
            } else {
                out.push(c);
            }
            continue;
        }
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
            } else {
                in_quote = false;
                out.push(' ');
            }
        }
    }

    if in_quote {
        return Err(CalcError::UnsafeExpression(
            "unterminated string literal".to_string(),
        ));
    }
    Ok(out)
}

/// Clean and check: the sanitizer stage of translation
pub fn sanitize(expr: &str) -> Result<String> {
    let cleaned = clean(expr);
    reject_if_unsafe(&cleaned)?;
    Ok(cleaned)
}
