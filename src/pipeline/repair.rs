//! Light structural repair of near-JSON text.
//!
//! Handles the damage language models actually produce, nothing more:
//!
//! - trailing commas before `}` / `]`
//! - raw newlines and tabs inside string literals
//! - a string left open by a truncated response
//! - a dangling key (`"qty"`) or dangling colon (`"qty":`) at the cut point
//! - closers that are missing or out of order
//!
//! This is not a JSON5 parser: single quotes, comments and unquoted keys are
//! left alone and will still fail to parse.

use super::locate::closer_for;

/// Output of one repair pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub text: String,
    /// Human-readable list of the fixes applied, in order.
    pub fixes: Vec<String>,
}

/// What the last significant token outside a string was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    Nothing,
    Open,
    Comma,
    Colon,
    /// A string that sits where an object key is expected.
    Key,
    Value,
}

/// Repair `text` in a single linear pass.
pub fn repair(text: &str) -> Repaired {
    let mut out = String::with_capacity(text.len() + 8);
    let mut fixes: Vec<String> = Vec::new();
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last = Last::Nothing;
    // Whether the currently open string started in key position.
    let mut string_is_key = false;
    let mut trailing_commas = 0usize;
    let mut escaped_controls = 0usize;
    let mut stray_closers = 0usize;
    let mut inserted_closers = String::new();

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(ch);
            } else if ch == '\\' {
                escaped = true;
                out.push(ch);
            } else if ch == '"' {
                in_string = false;
                last = if string_is_key { Last::Key } else { Last::Value };
                out.push(ch);
            } else if ch == '\n' {
                escaped_controls += 1;
                out.push_str("\\n");
            } else if ch == '\t' {
                escaped_controls += 1;
                out.push_str("\\t");
            } else if ch.is_control() {
                escaped_controls += 1;
            } else {
                out.push(ch);
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                string_is_key =
                    stack.last() == Some(&'{') && matches!(last, Last::Open | Last::Comma);
                out.push(ch);
            }
            '{' | '[' => {
                stack.push(ch);
                last = Last::Open;
                out.push(ch);
            }
            '}' | ']' => {
                let opener = if ch == '}' { '{' } else { '[' };
                if !stack.contains(&opener) {
                    stray_closers += 1;
                    continue;
                }
                while let Some(&top) = stack.last() {
                    if top == opener {
                        break;
                    }
                    let c = closer_for(top);
                    inserted_closers.push(c);
                    out.push(c);
                    stack.pop();
                }
                stack.pop();
                last = Last::Value;
                out.push(ch);
            }
            ',' => {
                let next = text[idx + 1..].trim_start().chars().next();
                if matches!(next, Some('}') | Some(']') | None) {
                    trailing_commas += 1;
                    continue;
                }
                last = Last::Comma;
                out.push(ch);
            }
            ':' => {
                last = Last::Colon;
                out.push(ch);
            }
            c if c.is_whitespace() => out.push(c),
            c => {
                if matches!(last, Last::Colon | Last::Open | Last::Comma | Last::Nothing) {
                    last = Last::Value;
                }
                out.push(c);
            }
        }
    }

    if trailing_commas > 0 {
        fixes.push(format!("removed {trailing_commas} trailing comma(s)"));
    }
    if escaped_controls > 0 {
        fixes.push(format!(
            "escaped {escaped_controls} control character(s) inside strings"
        ));
    }
    if stray_closers > 0 {
        fixes.push(format!("dropped {stray_closers} unmatched closer(s)"));
    }
    if !inserted_closers.is_empty() {
        fixes.push(format!("inserted missing '{inserted_closers}' before a closer"));
    }

    // ── End of input: close whatever the truncation left open ────────────
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
        last = if string_is_key { Last::Key } else { Last::Value };
        fixes.push("closed an unterminated string".into());
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);

    match last {
        Last::Key => {
            out.push_str(":null");
            fixes.push("filled a dangling key with null".into());
        }
        Last::Colon => {
            out.push_str("null");
            fixes.push("filled a dangling value with null".into());
        }
        Last::Comma => {
            if out.ends_with(',') {
                out.pop();
            }
            fixes.push("removed a dangling comma".into());
        }
        _ => {}
    }

    if !stack.is_empty() {
        let closers: String = stack.iter().rev().map(|&o| closer_for(o)).collect();
        out.push_str(&closers);
        fixes.push(format!("appended missing '{closers}'"));
    }

    Repaired { text: out, fixes }
}

/// Cut `text` back to the `nth` (1-based, counting from the end) value
/// boundary: just before a separating comma, or just after a closed
/// container. Returns `None` when there are fewer than `nth` boundaries.
pub fn cut_back(text: &str, nth: usize) -> Option<&str> {
    if nth == 0 {
        return Some(text);
    }
    let mut boundaries: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth > 0 {
                    boundaries.push(idx + 1);
                }
            }
            ',' if depth > 0 => boundaries.push(idx),
            _ => {}
        }
    }

    boundaries.retain(|&b| b < text.trim_end().len());
    boundaries.dedup();
    let pos = boundaries.len().checked_sub(nth)?;
    Some(&text[..boundaries[pos]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parses(s: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(s).is_ok()
    }

    #[test]
    fn removes_trailing_commas() {
        let r = repair(r#"{"items":[{"a":1,},{"a":2},],}"#);
        assert_eq!(r.text, r#"{"items":[{"a":1},{"a":2}]}"#);
        assert!(r.fixes[0].contains("trailing comma"));
    }

    #[test]
    fn appends_missing_closers() {
        let r = repair(r#"{"items":[{"a":1},{"a":2}"#);
        assert_eq!(r.text, r#"{"items":[{"a":1},{"a":2}]}"#);
    }

    #[test]
    fn closes_unterminated_value_string() {
        let r = repair(r#"{"items":[{"description":"Ha"#);
        assert_eq!(r.text, r#"{"items":[{"description":"Ha"}]}"#);
        assert!(parses(&r.text));
    }

    #[test]
    fn fills_dangling_key() {
        let r = repair(r#"{"items":[{"description":"Hay","qua"#);
        assert_eq!(r.text, r#"{"items":[{"description":"Hay","qua":null}]}"#);
        assert!(parses(&r.text));
    }

    #[test]
    fn fills_dangling_colon() {
        let r = repair(r#"{"items":[{"description":"Hay","quantity": "#);
        assert!(parses(&r.text), "got {}", r.text);
    }

    #[test]
    fn drops_dangling_comma() {
        let r = repair(r#"[{"description":"Hay"},"#);
        assert_eq!(r.text, r#"[{"description":"Hay"}]"#);
    }

    #[test]
    fn escapes_raw_newlines_in_strings() {
        let r = repair("{\"description\":\"line one\nline two\"}");
        assert!(parses(&r.text), "got {}", r.text);
    }

    #[test]
    fn inserts_out_of_order_closer() {
        let r = repair(r#"{"items":[{"a":1}}"#);
        assert!(parses(&r.text), "got {}", r.text);
    }

    #[test]
    fn untouched_when_valid() {
        let r = repair(r#"{"a":[1,2,{"b":"c"}]}"#);
        assert_eq!(r.text, r#"{"a":[1,2,{"b":"c"}]}"#);
        assert!(r.fixes.is_empty());
    }

    #[test]
    fn cut_back_to_last_boundary() {
        let text = r#"{"items":[{"a":1},{"a":2},{"desc"#;
        assert_eq!(cut_back(text, 1), Some(r#"{"items":[{"a":1},{"a":2}"#));
        assert_eq!(cut_back(text, 2), Some(r#"{"items":[{"a":1}"#));
        assert!(cut_back(text, 99).is_none());
    }

    #[test]
    fn cut_back_then_repair_parses() {
        let text = r#"{"items":[{"description":"Hay","quantity":2},{"description":"Oats"},{"desc"#;
        let cut = cut_back(text, 1).unwrap();
        let r = repair(cut);
        let v: serde_json::Value = serde_json::from_str(&r.text).unwrap();
        assert_eq!(v["items"].as_array().unwrap().len(), 2);
    }
}
