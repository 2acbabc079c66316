//! CSV matcher data for mapping rules.
//!
//! Keep stores the CSV text verbatim and also wants it pre-parsed into rows
//! keyed by the header. Comparison between configuration and server state
//! happens on the normalized text so that line endings and surrounding
//! whitespace never produce a diff.

use std::collections::BTreeMap;

use thiserror::Error;

/// One data row keyed by header column.
pub type CsvRow = BTreeMap<String, String>;

const PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    #[error("CSV data has no header row")]
    Empty,
    #[error(
        "CSV record on line {line} has wrong number of fields: expected {expected}, got {found}"
    )]
    FieldCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },
}

/// Trims surrounding whitespace and converts `\r\n` and lone `\r` to `\n`.
/// Idempotent.
pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

pub fn equivalent(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// True when the text carries no data once normalized.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Parses CSV text into header-keyed rows.
///
/// The first record is the header. Every later record must have exactly as
/// many fields as the header. Keys and values are trimmed; blank lines are
/// skipped; double-quoted fields may contain commas, newlines and `""`.
pub fn parse(text: &str) -> Result<Vec<CsvRow>, CsvError> {
    let normalized = normalize(text);
    let mut records = read_records(&normalized)?.into_iter();

    let (_, header) = records.next().ok_or(CsvError::Empty)?;
    let header: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();

    records
        .map(|(line, fields)| {
            if fields.len() != header.len() {
                return Err(CsvError::FieldCountMismatch {
                    line,
                    expected: header.len(),
                    found: fields.len(),
                });
            }
            Ok(header
                .iter()
                .cloned()
                .zip(fields.iter().map(|f| f.trim().to_string()))
                .collect())
        })
        .collect()
}

/// Short, log-safe description of CSV text: length and the start of the header.
pub fn preview(text: &str) -> String {
    let header = text.lines().next().unwrap_or_default();
    let mut shown: String = header.chars().take(PREVIEW_CHARS).collect();
    if header.chars().count() > PREVIEW_CHARS {
        shown.push_str("...");
    }
    format!("{} bytes, header '{}'", text.len(), shown)
}

/// Splits normalized text into records, returning each record with the line
/// it starts on.
fn read_records(text: &str) -> Result<Vec<(usize, Vec<String>)>, CsvError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut quote_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quote_line = line;
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            '\n' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
                push_record(&mut records, record_line, std::mem::take(&mut fields));
                line += 1;
                record_line = line;
            }
            '\n' => {
                field.push(c);
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CsvError::UnterminatedQuote { line: quote_line });
    }
    fields.push(field);
    push_record(&mut records, record_line, fields);

    Ok(records)
}

fn push_record(records: &mut Vec<(usize, Vec<String>)>, line: usize, fields: Vec<String>) {
    let blank = fields.len() == 1 && fields[0].trim().is_empty();
    if !blank {
        records.push((line, fields));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> CsvRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_simple() {
        let rows = parse("a,b\n1,2\n3,4").unwrap();
        assert_eq!(rows, vec![row(&[("a", "1"), ("b", "2")]), row(&[("a", "3"), ("b", "4")])]);
    }

    #[test]
    fn test_parse_trims_keys_and_values() {
        let rows = parse(" service , owner \n api ,  team-a \n").unwrap();
        assert_eq!(rows, vec![row(&[("service", "api"), ("owner", "team-a")])]);
    }

    #[test]
    fn test_parse_header_only_yields_no_rows() {
        assert!(parse("a,b\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert_eq!(parse("   \n\r\n"), Err(CsvError::Empty));
    }

    #[test]
    fn test_parse_field_count_mismatch() {
        let err = parse("a,b\n1,2,3").unwrap_err();
        assert_eq!(
            err,
            CsvError::FieldCountMismatch {
                line: 2,
                expected: 2,
                found: 3
            }
        );
        assert!(err.to_string().contains("expected 2, got 3"));
    }

    #[test]
    fn test_parse_quoted_fields() {
        let rows = parse("name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n\"multi\nline\",x").unwrap();
        assert_eq!(rows[0]["name"], "Smith, J");
        assert_eq!(rows[0]["note"], "said \"hi\"");
        assert_eq!(rows[1]["name"], "multi\nline");
    }

    #[test]
    fn test_parse_unterminated_quote() {
        assert_eq!(
            parse("a,b\n\"open,2"),
            Err(CsvError::UnterminatedQuote { line: 2 })
        );
    }

    #[test]
    fn test_parse_skips_blank_lines_and_crlf() {
        let rows = parse("a,b\r\n\r\n1,2\r\n\r\n3,4\r\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["b"], "4");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = ["  a,b\r\n1,2\r\n ", "a,b\r1,2\r", "\n\na,b\n", ""];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
        assert_eq!(normalize("  a,b\r\n1,2\r\n "), "a,b\n1,2");
    }

    #[test]
    fn test_equivalent_ignores_line_endings() {
        assert!(equivalent("a,b\r\n1,2\r\n", "a,b\n1,2"));
        assert!(equivalent("\ta,b\n1,2  ", "a,b\r1,2"));
        assert!(!equivalent("a,b\n1,2", "a,b\n1,3"));
    }

    #[test]
    fn test_preview_hides_data_rows() {
        let text = "service,owner\nsecret-service,alice";
        let shown = preview(text);
        assert!(shown.contains("service,owner"));
        assert!(!shown.contains("alice"));
    }
}
