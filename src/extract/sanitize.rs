// src/extract/sanitize.rs

/// Normalize header text into a warehouse-safe column name.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`, runs of `_` collapse
/// to one, and the result is lowercased. Applying it twice changes nothing.
pub fn sanitize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_us = false;
    for ch in raw.chars() {
        let ch = if ch.is_ascii_alphanumeric() || ch == '_' {
            ch.to_ascii_lowercase()
        } else {
            '_'
        };
        if ch == '_' {
            if last_us {
                continue;
            }
            last_us = true;
        } else {
            last_us = false;
        }
        out.push(ch);
    }
    out
}

fn needs_quotes(cell: &str) -> bool {
    let edge_ws = |c: Option<char>| c.is_some_and(char::is_whitespace);
    cell.contains(',')
        || cell.contains('\n')
        || cell.contains('\r')
        || edge_ws(cell.chars().next())
        || edge_ws(cell.chars().next_back())
}

/// Escape a raw cell value into a CSV field.
///
/// `""` (a literal pair of quotes) is treated like an empty cell. Embedded
/// quotes are always doubled; the field is wrapped in quotes only when it
/// holds a comma, a line break, or leading/trailing whitespace.
pub fn escape_cell(cell: &str) -> String {
    if cell.is_empty() || cell == "\"\"" {
        return String::new();
    }

    let doubled = cell.replace('"', "\"\"");
    if needs_quotes(cell) {
        let mut out = String::with_capacity(doubled.len() + 2);
        out.push('"');
        out.push_str(&doubled);
        out.push('"');
        out
    } else {
        doubled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_examples() {
        assert_eq!(sanitize_header("Clicks!!"), "clicks_");
        assert_eq!(sanitize_header("  Cost (USD)  "), "_cost_usd_");
        assert_eq!(sanitize_header("Avg. CPC"), "avg_cpc");
        assert_eq!(sanitize_header("already_clean_9"), "already_clean_9");
        assert_eq!(sanitize_header("Ümlaut—Spalte"), "_mlaut_spalte");
        assert_eq!(sanitize_header(""), "");
    }

    #[test]
    fn test_escape_empty_equivalents() {
        assert_eq!(escape_cell(""), "");
        assert_eq!(escape_cell("\"\""), "");
    }

    #[test]
    fn test_escape_rules() {
        assert_eq!(escape_cell("1,234"), "\"1,234\"");
        assert_eq!(escape_cell("plain"), "plain");
        assert_eq!(escape_cell("say \"hi\""), "say \"\"hi\"\"");
        assert_eq!(escape_cell("a,\"b\""), "\"a,\"\"b\"\"\"");
        assert_eq!(escape_cell(" lead"), "\" lead\"");
        assert_eq!(escape_cell("trail\t"), "\"trail\t\"");
        assert_eq!(escape_cell("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_cell("inner space"), "inner space");
        // lone quote is not the empty marker
        assert_eq!(escape_cell("\""), "\"\"");
    }

    proptest! {
        #[test]
        fn prop_sanitize_idempotent(s in any::<String>()) {
            let once = sanitize_header(&s);
            prop_assert_eq!(sanitize_header(&once), once.clone());
            prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            prop_assert!(!once.contains("__"));
        }

        #[test]
        fn prop_escape_wraps_when_needed(s in "\\PC{0,24}") {
            let escaped = escape_cell(&s);
            if !(s.is_empty() || s == "\"\"") && needs_quotes(&s) {
                prop_assert!(escaped.len() >= 2);
                prop_assert!(escaped.starts_with('"') && escaped.ends_with('"'));
            }
        }

        #[test]
        fn prop_escape_doubles_quotes(s in "[a-z\", ]{1,24}") {
            prop_assume!(s != "\"\"");
            let escaped = escape_cell(&s);
            let inner = if needs_quotes(&s) {
                &escaped[1..escaped.len() - 1]
            } else {
                escaped.as_str()
            };
            prop_assert_eq!(inner.replace("\"\"", "\""), s.clone());
            prop_assert_eq!(inner.matches('"').count(), 2 * s.matches('"').count());
        }
    }
}
