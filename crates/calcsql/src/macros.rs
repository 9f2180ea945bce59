/// Macro expander for calculation helper functions
///
/// Rewrites a closed set of helpers into primitive SQL before parsing:
///
/// - `OM_DIV_BY(x)` => `CASE WHEN ABS(x) > 1e-37 THEN x ELSE NULL END`
/// - `OM_IF(cond THEN value ELSE other)` => `CASE WHEN cond THEN value ELSE other END`
///
/// Only whole-token helper names outside of string literals are expanded.
/// Any other function-like token is left for the parser.
use crate::error::{CalcError, Result};

/// Helper functions known to the expander
#[derive(Debug, Clone, Copy, PartialEq)]
enum Macro {
    DivBy,
    If,
}

impl Macro {
    fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("OM_DIV_BY") {
            Some(Macro::DivBy)
        } else if name.eq_ignore_ascii_case("OM_IF") {
            Some(Macro::If)
        } else {
            None
        }
    }
}

/// Lexical piece of the source text, outside of string literals
#[derive(Debug, Clone, Copy, PartialEq)]
enum Piece {
    Word { start: usize, end: usize },
    Open(usize),
    Close(usize),
}

/// Expand all helper functions. `epsilon` is the near-zero bound of OM_DIV_BY.
pub fn expand(expr: &str, epsilon: f64) -> Result<String> {
    let pieces = scan(expr);
    let mut out = String::with_capacity(expr.len());
    let mut pos = 0;
    let mut k = 0;

    while k < pieces.len() {
        let Piece::Word { start, end } = pieces[k] else {
            k += 1;
            continue;
        };
        let Some(m) = Macro::from_name(&expr[start..end]) else {
            k += 1;
            continue;
        };

        // helper name must be followed by an opening parenthesis
        let open = match pieces.get(k + 1) {
            Some(Piece::Open(o)) if expr[end..*o].trim().is_empty() => *o,
            _ => {
                k += 1;
                continue;
            }
        };
        let (close_k, close) = matching_close(&pieces, k + 1).ok_or_else(|| {
            CalcError::MalformedExpression(format!(
                "unbalanced parenthesis after {}",
                &expr[start..end]
            ))
        })?;

        let arg = &expr[open + 1..close];
        let replacement = match m {
            Macro::DivBy => expand_div_by(arg, epsilon)?,
            Macro::If => expand_if(arg, epsilon)?,
        };

        out.push_str(&expr[pos..start]);
        out.push_str(&replacement);
        pos = close + 1;
        k = close_k + 1;
    }

    out.push_str(&expr[pos..]);
    Ok(out)
}

fn expand_div_by(arg: &str, epsilon: f64) -> Result<String> {
    let x = expand(arg, epsilon)?;
    let x = x.trim();
    if x.is_empty() {
        return Err(CalcError::MalformedExpression(
            "OM_DIV_BY argument is empty".to_string(),
        ));
    }
    Ok(format!(
        "CASE WHEN ABS({x}) > {epsilon:e} THEN {x} ELSE NULL END"
    ))
}

fn expand_if(arg: &str, epsilon: f64) -> Result<String> {
    let then_at = top_level_keyword(arg, "THEN", 0).ok_or_else(|| {
        CalcError::MalformedExpression("OM_IF requires THEN".to_string())
    })?;
    let else_at = top_level_keyword(arg, "ELSE", then_at + 4);

    let cond = &arg[..then_at];
    let (value, other) = match else_at {
        Some(e) => (&arg[then_at + 4..e], Some(&arg[e + 4..])),
        None => (&arg[then_at + 4..], None),
    };

    let cond = expand(cond, epsilon)?;
    let value = expand(value, epsilon)?;
    let other = match other {
        Some(o) => expand(o, epsilon)?,
        None => "NULL".to_string(),
    };
    let (cond, value, other) = (cond.trim(), value.trim(), other.trim());
    if cond.is_empty() || value.is_empty() || other.is_empty() {
        return Err(CalcError::MalformedExpression(
            "OM_IF condition, value and ELSE value cannot be empty".to_string(),
        ));
    }
    Ok(format!("CASE WHEN {cond} THEN {value} ELSE {other} END"))
}

/// Split text into words and parentheses, skipping string literals and numbers
fn scan(text: &str) -> Vec<Piece> {
    let b = text.as_bytes();
    let mut pieces = Vec::new();
    let mut i = 0;

    while i < b.len() {
        match b[i] {
            b'\'' => {
                i += 1;
                while i < b.len() {
                    if b[i] == b'\'' {
                        if i + 1 < b.len() && b[i + 1] == b'\'' {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'(' => {
                pieces.push(Piece::Open(i));
                i += 1;
            }
            b')' => {
                pieces.push(Piece::Close(i));
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == b'_') {
                    i += 1;
                }
                pieces.push(Piece::Word { start, end: i });
            }
            c if c.is_ascii_digit() => {
                // numbers like 1.0e-37: the exponent letter is not a word
                while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == b'.') {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    pieces
}

/// Piece index and byte offset of the parenthesis closing the one opened at `open_k`
fn matching_close(pieces: &[Piece], open_k: usize) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    for (j, piece) in pieces.iter().enumerate().skip(open_k) {
        match piece {
            Piece::Open(_) => depth += 1,
            Piece::Close(pos) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some((j, *pos));
                }
            }
            Piece::Word { .. } => {}
        }
    }
    None
}

/// Byte offset of the first whole-word keyword at or after `from`,
/// outside of parentheses and CASE ... END blocks
fn top_level_keyword(text: &str, keyword: &str, from: usize) -> Option<usize> {
    let mut parens = 0i32;
    let mut cases = 0i32;

    for piece in scan(text) {
        match piece {
            Piece::Open(_) => parens += 1,
            Piece::Close(_) => parens -= 1,
            Piece::Word { start, end } => {
                let word = &text[start..end];
                if word.eq_ignore_ascii_case("CASE") {
                    cases += 1;
                } else if word.eq_ignore_ascii_case("END") {
                    cases -= 1;
                } else if parens == 0
                    && cases == 0
                    && start >= from
                    && word.eq_ignore_ascii_case(keyword)
                {
                    return Some(start);
                }
            }
        }
    }
    None
}
