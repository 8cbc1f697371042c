//! Team-name normalization.
//!
//! Spreadsheets spell the same team with stray spaces and assorted quote
//! characters. Case is kept: names compare case-sensitively.

/// Normalize a raw team name from a sheet.
pub fn normalize_team_name(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| match c {
            '«' | '»' | '“' | '”' | '„' | '‟' => '"',
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => ' ',
            other => other,
        })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_collapses() {
        assert_eq!(normalize_team_name("  Совы \t  не те "), "Совы не те");
    }

    #[test]
    fn test_non_breaking_spaces() {
        assert_eq!(normalize_team_name("Ёжики\u{00A0}в\u{202F}тумане"), "Ёжики в тумане");
    }

    #[test]
    fn test_quotes_unified() {
        assert_eq!(normalize_team_name("«Лига» “Знатоков”"), "\"Лига\" \"Знатоков\"");
    }

    #[test]
    fn test_case_preserved() {
        assert_ne!(normalize_team_name("Совы"), normalize_team_name("СОВЫ"));
    }
}
