//! Loading question suites from human-edited CSV files.
//!
//! Expected header (any column order): `code,topic,difficulty,text`.
//! Only `code` and `text` are required. Fields are trimmed, quoted fields
//! support commas and doubled-quote escapes, and a UTF-8 BOM at the start of
//! the file is ignored.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use trainer_core::model::{Difficulty, QuestionDraft};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    /// The suite has no source file yet. Callers syncing several suites
    /// treat this as "skip", not as a failure.
    #[error("source file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("unreadable source file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required column '{column}' in {}", path.display())]
    MissingColumn {
        path: PathBuf,
        column: &'static str,
    },

    #[error("row {row} in {}: {reason}", path.display())]
    InvalidRow {
        path: PathBuf,
        row: usize,
        reason: String,
    },
}

/// Loads one suite's records from `<dir>/<suite>.csv`.
///
/// # Errors
///
/// Returns `SourceError::NotFound` when the file does not exist, and the
/// other `SourceError` variants for unreadable or malformed content.
pub fn load_suite(dir: &Path, suite: &str) -> Result<Vec<QuestionDraft>, SourceError> {
    let path = dir.join(format!("{suite}.csv"));
    if !path.exists() {
        return Err(SourceError::NotFound { path });
    }

    let content = std::fs::read_to_string(&path).map_err(|source| SourceError::Unreadable {
        path: path.clone(),
        source,
    })?;

    let records = parse_records(&content, &path)?;
    info!(suite = %suite, count = records.len(), path = %path.display(), "loaded suite source");
    Ok(records)
}

/// Parses CSV content into validated records.
fn parse_records(content: &str, path: &Path) -> Result<Vec<QuestionDraft>, SourceError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut lines = content.lines().enumerate();
    let Some((_, header_line)) = lines.next() else {
        return Ok(Vec::new());
    };

    let header: Vec<String> = parse_line(header_line)
        .into_iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let find = |name: &str| header.iter().position(|h| h == name);
    let code_idx = find("code").ok_or_else(|| SourceError::MissingColumn {
        path: path.to_path_buf(),
        column: "code",
    })?;
    let text_idx = find("text").ok_or_else(|| SourceError::MissingColumn {
        path: path.to_path_buf(),
        column: "text",
    })?;
    let topic_idx = find("topic");
    let difficulty_idx = find("difficulty");

    let mut out = Vec::new();
    for (line_idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }

        // 1-based line number, counting the header.
        let row = line_idx + 1;
        let invalid = |reason: String| SourceError::InvalidRow {
            path: path.to_path_buf(),
            row,
            reason,
        };

        let cols = parse_line(line);
        if code_idx >= cols.len() || text_idx >= cols.len() {
            return Err(invalid("not enough columns".to_string()));
        }

        let code = cols[code_idx].trim();
        if code.is_empty() {
            return Err(invalid("empty 'code'".to_string()));
        }
        let text = cols[text_idx].trim();
        if text.is_empty() {
            return Err(invalid(format!("empty 'text' for code '{code}'")));
        }

        let topic = topic_idx
            .and_then(|idx| cols.get(idx))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let difficulty = difficulty_idx
            .and_then(|idx| cols.get(idx))
            .map(|raw| Difficulty::from_token(raw))
            .unwrap_or_default();

        let draft = QuestionDraft::new(code, text, topic, difficulty)
            .map_err(|e| invalid(e.to_string()))?;
        out.push(draft);
    }

    Ok(out)
}

/// Minimal CSV line split supporting quoted fields and commas inside quotes.
/// Quotes are escaped by doubling them: `""` -> `"`.
fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(8);
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }

    fields.push(current);
    fields
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(content: &str) -> Result<Vec<QuestionDraft>, SourceError> {
        parse_records(content, Path::new("test.csv"))
    }

    #[test]
    fn parses_minimal_header_in_any_order() {
        let records = parse("text,code\nWhat is a trait?,mos_001\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].code(), "mos_001");
        assert_eq!(records[0].text(), "What is a trait?");
        assert_eq!(records[0].topic(), None);
        assert_eq!(records[0].difficulty(), Difficulty::Basic);
    }

    #[test]
    fn parses_full_header_with_optional_fields() {
        let content = "code,topic,difficulty,text\n\
                       mos_001,threads, 2 ,Explain a mutex\n\
                       mos_002,,сложный,Explain channels\n";
        let records = parse(content).unwrap();
        assert_eq!(records[0].topic(), Some("threads"));
        assert_eq!(records[0].difficulty(), Difficulty::Working);
        assert_eq!(records[1].topic(), None);
        assert_eq!(records[1].difficulty(), Difficulty::Advanced);
    }

    #[test]
    fn strips_bom_and_skips_blank_lines() {
        let content = "\u{feff}code,text\n\nmos_001,Q1\n   \nmos_002,Q2\n";
        let records = parse(content).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn handles_quoted_fields_and_escaped_quotes() {
        let content = "code,text\nmos_001,\"Why is \"\"Send\"\", not Sync, enough here?\"\n";
        let records = parse(content).unwrap();
        assert_eq!(
            records[0].text(),
            "Why is \"Send\", not Sync, enough here?"
        );
    }

    #[test]
    fn rejects_missing_required_column() {
        let err = parse("code,topic\nmos_001,threads\n").unwrap_err();
        assert!(matches!(
            err,
            SourceError::MissingColumn { column: "text", .. }
        ));
    }

    #[test]
    fn rejects_short_rows_and_empty_required_fields() {
        let err = parse("code,text\nmos_001\n").unwrap_err();
        assert!(matches!(err, SourceError::InvalidRow { row: 2, .. }));

        let err = parse("code,text\n  ,question\n").unwrap_err();
        assert!(matches!(err, SourceError::InvalidRow { row: 2, .. }));

        let err = parse("code,text\nmos_001,Q1\nmos_002,   \n").unwrap_err();
        assert!(matches!(err, SourceError::InvalidRow { row: 3, .. }));
    }

    #[test]
    fn empty_content_yields_no_records() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("code,text\n").unwrap().is_empty());
    }

    #[test]
    fn load_suite_distinguishes_absent_from_malformed() {
        let dir = tempfile::tempdir().unwrap();

        let err = load_suite(dir.path(), "mos").unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));

        let mut file = std::fs::File::create(dir.path().join("mos.csv")).unwrap();
        writeln!(file, "topic,text").unwrap();
        writeln!(file, "threads,Q1").unwrap();
        let err = load_suite(dir.path(), "mos").unwrap_err();
        assert!(matches!(
            err,
            SourceError::MissingColumn { column: "code", .. }
        ));
    }

    #[test]
    fn load_suite_reads_a_well_formed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ed.csv"),
            "code,text,difficulty\ned_001,First question,1\ned_002,Second question,3\n",
        )
        .unwrap();

        let records = load_suite(dir.path(), "ed").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].difficulty(), Difficulty::Advanced);
    }
}
