//! Tolerant CSV extraction and parsing.
//!
//! The worker delivers its result table two ways: embedded in stdout between
//! literal marker lines, or as a file written at the `-o` path. Both carry
//! the same header conventions, so this module parses either into
//! [`BusinessRecord`]s keyed by normalized header names.

use crate::model::BusinessRecord;
use std::collections::HashMap;
use std::mem::take;
use std::path::Path;
use thiserror::Error;

/// Literal marker lines delimiting the embedded table in worker stdout.
pub const CSV_START_MARKER: &str = "--- CSV_DATA_START ---";
pub const CSV_END_MARKER: &str = "--- CSV_DATA_END ---";

#[derive(Debug, Error)]
pub enum TableError {
    /// Fewer than header + one data row. Distinguishes "no data" from
    /// "not a CSV at all".
    #[error("expected a header row and at least one data row, got {lines} non-blank lines")]
    TooFewRows { lines: usize },
}

/// Normalize a header cell into a canonical lookup key: lowercase,
/// whitespace runs collapse to a single underscore, anything outside
/// `[a-z0-9_]` is dropped. Idempotent.
pub fn normalize_header(cell: &str) -> String {
    let mut out = String::with_capacity(cell.len());
    let mut pending_sep = false;
    for ch in cell.trim().chars() {
        if ch.is_whitespace() {
            pending_sep = !out.is_empty();
            continue;
        }
        for lc in ch.to_lowercase() {
            if lc.is_ascii_alphanumeric() || lc == '_' {
                if pending_sep {
                    out.push('_');
                    pending_sep = false;
                }
                out.push(lc);
            }
        }
    }
    out
}

/// Quote-aware single-pass row scanner. A comma only separates fields
/// outside a quoted region; `""` inside quotes is an escaped quote; blank
/// lines are skipped.
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() > 1 || !row[0].is_empty() {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // Flush the trailing row even if the final line had no terminator or an
    // unterminated quote.
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Parse delimited text into one map per data row, keyed by normalized
/// header names. The first non-blank row is always the header.
pub fn parse_text(text: &str) -> Result<Vec<HashMap<String, String>>, TableError> {
    let mut rows = parse_rows(text);
    if rows.len() < 2 {
        return Err(TableError::TooFewRows { lines: rows.len() });
    }
    let header: Vec<String> = rows.remove(0).iter().map(|c| normalize_header(c)).collect();

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        // Rows shorter than the header leave keys absent (the record
        // assembler defaults them to empty); extra cells are dropped.
        let map: HashMap<String, String> = header
            .iter()
            .cloned()
            .zip(row.into_iter())
            .filter(|(k, _)| !k.is_empty())
            .collect();
        out.push(map);
    }
    Ok(out)
}

/// Scan full captured output for the literal markers and return the trimmed
/// text strictly between them. Either marker absent means "no embedded
/// table", which is not an error — the caller falls back to the result file.
pub fn extract_embedded(full_output: &str, start_marker: &str, end_marker: &str) -> Option<String> {
    let start = full_output.find(start_marker)? + start_marker.len();
    let rest = &full_output[start..];
    let end = rest.find(end_marker)?;
    Some(rest[..end].trim().to_string())
}

/// Ordered alias lists mapping normalized header variants onto the logical
/// schema. First alias present in the row wins; tolerating "Phone Number"
/// vs "phone_number" vs "PhoneNumber" without per-format branching.
const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("name", &["name", "business_name", "company"]),
    ("address", &["address", "full_address", "location"]),
    ("phone", &["phone_number", "phonenumber", "phone"]),
    ("email", &["email", "email_address"]),
    ("website", &["website", "url", "web_site"]),
    ("rating", &["rating", "stars"]),
    ("review_count", &["review_count", "reviews", "number_of_reviews"]),
    (
        "additional_phones",
        &["additional_phone_numbers", "additional_phones", "other_phones"],
    ),
    ("additional_emails", &["additional_emails", "other_emails"]),
    ("social_links", &["social_links", "social_media", "socials"]),
];

fn pick<'a>(row: &'a HashMap<String, String>, aliases: &[&str]) -> String {
    aliases
        .iter()
        .find_map(|k| row.get(*k))
        .cloned()
        .unwrap_or_default()
}

/// Assemble one record from a normalized row. Absent fields become empty
/// strings, never null.
pub fn record_from_row(row: &HashMap<String, String>) -> BusinessRecord {
    let field = |name: &str| {
        FIELD_ALIASES
            .iter()
            .find(|(f, _)| *f == name)
            .map(|(_, aliases)| pick(row, aliases))
            .unwrap_or_default()
    };
    BusinessRecord {
        name: field("name"),
        address: field("address"),
        phone: field("phone"),
        email: field("email"),
        website: field("website"),
        rating: field("rating"),
        review_count: field("review_count"),
        additional_phones: field("additional_phones"),
        additional_emails: field("additional_emails"),
        social_links: field("social_links"),
    }
}

/// Parse CSV text straight into records.
pub fn records_from_text(text: &str) -> Result<Vec<BusinessRecord>, TableError> {
    Ok(parse_text(text)?.iter().map(record_from_row).collect())
}

/// Read and parse a standalone result file (the `-o` fallback path).
pub fn read_result_file(path: &Path) -> anyhow::Result<Vec<BusinessRecord>> {
    let text = std::fs::read_to_string(path)?;
    Ok(records_from_text(&text)?)
}

const CANONICAL_HEADER: &[&str] = &[
    "Name",
    "Address",
    "Phone Number",
    "Email",
    "Website",
    "Rating",
    "Review Count",
    "Additional Phone Numbers",
    "Additional Emails",
    "Social Links",
];

fn write_cell(out: &mut String, cell: &str) {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        out.push('"');
        out.push_str(&cell.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(cell);
    }
}

fn write_row(out: &mut String, cells: &[&str]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_cell(out, cell);
    }
    out.push('\n');
}

/// Serialize records into the embedded-block text format. Re-parsing the
/// output reproduces the same logical records.
pub fn to_csv_text(records: &[BusinessRecord]) -> String {
    let mut out = String::new();
    write_row(&mut out, CANONICAL_HEADER);
    for r in records {
        write_row(
            &mut out,
            &[
                &r.name,
                &r.address,
                &r.phone,
                &r.email,
                &r.website,
                &r.rating,
                &r.review_count,
                &r.additional_phones,
                &r.additional_emails,
                &r.social_links,
            ],
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_handles_header_variants() {
        assert_eq!(normalize_header("Phone Number"), "phone_number");
        assert_eq!(normalize_header("PhoneNumber"), "phonenumber");
        assert_eq!(normalize_header("  Review   Count "), "review_count");
        assert_eq!(normalize_header("Rating (stars)"), "rating_stars");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Phone Number", "E-Mail Address", "social_links", "Name"] {
            let once = normalize_header(raw);
            assert_eq!(normalize_header(&once), once);
        }
    }

    #[test]
    fn parse_returns_one_record_per_data_row() {
        let text = "Name,Address,Phone Number\nJoe's Pizza,1 Main St,555-0001\n\nAcme,2 Oak Ave,555-0002\n";
        let rows = parse_text(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Joe's Pizza");
        assert_eq!(rows[1]["phone_number"], "555-0002");
    }

    #[test]
    fn quoted_fields_keep_separators_and_escaped_quotes() {
        let text = "Name,Address\n\"Smith, Jones \"\"and\"\" Co\",\"5 High St, Floor 2\"\n";
        let rows = parse_text(text).unwrap();
        assert_eq!(rows[0]["name"], "Smith, Jones \"and\" Co");
        assert_eq!(rows[0]["address"], "5 High St, Floor 2");
    }

    #[test]
    fn header_only_is_too_few_rows() {
        let err = parse_text("Name,Address\n").unwrap_err();
        assert!(matches!(err, TableError::TooFewRows { lines: 1 }));
        assert!(matches!(
            parse_text("").unwrap_err(),
            TableError::TooFewRows { lines: 0 }
        ));
    }

    #[test]
    fn every_logical_field_is_populated() {
        let text = "Name\nJoe's Pizza\n";
        let records = records_from_text(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Joe's Pizza");
        // Missing columns come back as empty strings, never absent.
        assert_eq!(records[0].phone, "");
        assert_eq!(records[0].social_links, "");
    }

    #[test]
    fn phone_aliases_resolve_in_order() {
        let both = "Phone Number,Phone\n555-0001,555-9999\n";
        let records = records_from_text(both).unwrap();
        assert_eq!(records[0].phone, "555-0001");

        let fallback = "Phone\n555-9999\n";
        let records = records_from_text(fallback).unwrap();
        assert_eq!(records[0].phone, "555-9999");
    }

    #[test]
    fn extract_embedded_returns_interior_text() {
        let full = format!(
            "Searching…\n{}\nName,Phone\nJoe,555\n{}\nDone\n",
            CSV_START_MARKER, CSV_END_MARKER
        );
        let block = extract_embedded(&full, CSV_START_MARKER, CSV_END_MARKER).unwrap();
        assert_eq!(block, "Name,Phone\nJoe,555");
    }

    #[test]
    fn extract_embedded_is_none_when_a_marker_is_missing() {
        let only_start = format!("{}\nName\nJoe\n", CSV_START_MARKER);
        assert!(extract_embedded(&only_start, CSV_START_MARKER, CSV_END_MARKER).is_none());
        assert!(extract_embedded("plain output", CSV_START_MARKER, CSV_END_MARKER).is_none());
    }

    #[test]
    fn records_round_trip_through_csv_text() {
        let records = vec![
            BusinessRecord {
                name: "Smith, Jones and Co".into(),
                address: "5 High St, Floor 2".into(),
                phone: "555-0001".into(),
                email: "hi@smith.example".into(),
                website: "https://smith.example".into(),
                rating: "4.5".into(),
                review_count: "120".into(),
                additional_phones: "555-0002; 555-0003".into(),
                additional_emails: "".into(),
                social_links: "https://social.example/\"smith\"".into(),
            },
            BusinessRecord {
                name: "Acme".into(),
                ..Default::default()
            },
        ];
        let text = to_csv_text(&records);
        let reparsed = records_from_text(&text).unwrap();
        assert_eq!(reparsed, records);
    }
}
