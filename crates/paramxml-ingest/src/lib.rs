//! Plain-text document ingestion for paramxml
//!
//! Input files look like:
//!
//! ```text
//! Анкета сотрудника
//! - ФИО;
//! - Дата рождения;
//! • Должность.
//! ```
//!
//! The first non-blank line that is not a bullet item is the title. Every
//! bullet line (`-`, `*` or `•` followed by whitespace) is a parameter label;
//! the marker and trailing `;` / `.` are stripped.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

pub const TEXT_EXTENSION: &str = "txt";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{source_name}: file is empty")]
    Empty { source_name: String },
    #[error("{source_name}: no document title found")]
    MissingTitle { source_name: String },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: not valid UTF-8", path.display())]
    Encoding { path: PathBuf },
    #[error("{}: not a directory", path.display())]
    NotADirectory { path: PathBuf },
}

/// Title and raw labels of one source file, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    pub title: String,
    pub labels: Vec<String>,
}

fn bullet_re() -> &'static Regex {
    static BULLET: OnceLock<Regex> = OnceLock::new();
    BULLET.get_or_init(|| {
        Regex::new(r"^[-*•]\s+(.*)$").unwrap_or_else(|e| panic!("bullet regex: {e}"))
    })
}

/// Parse already-loaded text. `source_name` only appears in errors.
pub fn parse_text(source_name: &str, content: &str) -> Result<ParsedText, IngestError> {
    if content.trim().is_empty() {
        return Err(IngestError::Empty {
            source_name: source_name.to_string(),
        });
    }

    let mut title = None;
    let mut labels = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match bullet_re().captures(line) {
            Some(caps) => {
                // One trailing list terminator; an ellipsis keeps the rest.
                let label = caps[1].trim();
                let label = label.strip_suffix([';', '.']).unwrap_or(label).trim_end();
                if !label.is_empty() {
                    labels.push(label.to_string());
                }
            }
            None if title.is_none() => title = Some(line.to_string()),
            None => {
                tracing::debug!(source = source_name, line, "ignoring non-bullet line");
            }
        }
    }

    let title = title.ok_or_else(|| IngestError::MissingTitle {
        source_name: source_name.to_string(),
    })?;

    Ok(ParsedText { title, labels })
}

/// Read and parse a UTF-8 text file.
pub fn parse_text_file(path: &Path) -> Result<ParsedText, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8(bytes).map_err(|_| IngestError::Encoding {
        path: path.to_path_buf(),
    })?;
    // Editors on Windows like to prepend a BOM.
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    parse_text(&path.display().to_string(), content)
}

/// All `.txt` files under `dir`, recursively, sorted by path.
pub fn find_text_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let is_text = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(TEXT_EXTENSION));
        if is_text {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_title_and_labels() {
        let text = "\n  Анкета сотрудника\n- ФИО;\n- Дата рождения;\n• Должность.\n* Стаж\n";
        let parsed = parse_text("a.txt", text).unwrap();
        assert_eq!(parsed.title, "Анкета сотрудника");
        assert_eq!(
            parsed.labels,
            vec!["ФИО", "Дата рождения", "Должность", "Стаж"]
        );
    }

    #[test]
    fn test_hyphenated_title_is_not_a_bullet() {
        let parsed = parse_text("a.txt", "-Заголовок-\n- Параметр").unwrap();
        assert_eq!(parsed.title, "-Заголовок-");
        assert_eq!(parsed.labels, vec!["Параметр"]);
    }

    #[test]
    fn test_empty_bullets_are_dropped() {
        let parsed = parse_text("a.txt", "Т\n- ;\n-  .\n- Вес").unwrap();
        assert_eq!(parsed.labels, vec!["Вес"]);
    }

    #[test]
    fn test_only_one_terminator_is_stripped() {
        let parsed = parse_text("a.txt", "Т\n- Прочее...\n- Вес;;\n- Рост ;").unwrap();
        assert_eq!(parsed.labels, vec!["Прочее..", "Вес;", "Рост"]);
    }

    #[test]
    fn test_title_only() {
        let parsed = parse_text("a.txt", "Только заголовок").unwrap();
        assert!(parsed.labels.is_empty());
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse_text("a.txt", " \n\t\n"),
            Err(IngestError::Empty { .. })
        ));
        assert!(matches!(
            parse_text("a.txt", "- Вес\n- Рост"),
            Err(IngestError::MissingTitle { .. })
        ));
    }
}
