//! Cell sanitization for the spreadsheet backend.
//!
//! Spreadsheet formats reject most control characters, cap cell length, and
//! interpret leading `=`, `+`, `-`, `@` as formulas. Cells are sanitized
//! before emission and un-guarded on reread.

/// Per-cell character limit of the xlsx format.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Suffix retained on truncated cells.
pub const TRUNCATION_SUFFIX: &str = "[TRUNCATED]";

const FORMULA_LEADERS: [char; 4] = ['=', '+', '-', '@'];

/// Sanitize one cell value for spreadsheet emission.
pub fn sanitize_cell(value: &str) -> String {
    let stripped: String = value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();

    let guarded = if stripped.starts_with(FORMULA_LEADERS) {
        format!("'{}", stripped)
    } else {
        stripped
    };

    if guarded.chars().count() <= MAX_CELL_CHARS {
        return guarded;
    }
    let keep = MAX_CELL_CHARS - TRUNCATION_SUFFIX.chars().count();
    let mut truncated: String = guarded.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

/// Reverse the formula guard when reading cells back.
pub fn unguard_cell(value: &str) -> String {
    match value.strip_prefix('\'') {
        Some(rest) if rest.starts_with(FORMULA_LEADERS) => rest.to_string(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_guard_round_trip() {
        let stored = sanitize_cell("=SUM(1,2)");
        assert_eq!(stored, "'=SUM(1,2)");
        assert_eq!(unguard_cell(&stored), "=SUM(1,2)");
    }

    #[test]
    fn test_all_formula_leaders_guarded() {
        for leader in ['=', '+', '-', '@'] {
            let cell = format!("{}payload", leader);
            let stored = sanitize_cell(&cell);
            assert!(stored.starts_with('\''));
            assert_eq!(unguard_cell(&stored), cell);
        }
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(sanitize_cell("fn main() {}"), "fn main() {}");
        assert_eq!(unguard_cell("plain"), "plain");
        // A lone apostrophe that guards nothing is kept verbatim.
        assert_eq!(unguard_cell("'quoted"), "'quoted");
    }

    #[test]
    fn test_control_characters_stripped() {
        let dirty = "a\u{0000}b\u{0007}c\tkeeps\ntabs\rand newlines";
        let clean = sanitize_cell(dirty);
        assert_eq!(clean, "abc\tkeeps\ntabs\rand newlines");
    }

    #[test]
    fn test_truncation_retains_suffix() {
        let long = "x".repeat(MAX_CELL_CHARS + 100);
        let stored = sanitize_cell(&long);
        assert_eq!(stored.chars().count(), MAX_CELL_CHARS);
        assert!(stored.ends_with(TRUNCATION_SUFFIX));

        let exact = "x".repeat(MAX_CELL_CHARS);
        assert_eq!(sanitize_cell(&exact), exact);
    }
}
