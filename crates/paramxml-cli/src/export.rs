//! `paramxml mappings ...`: inspect the label -> identifier table.

use anyhow::{Context, Result};
use clap::ValueEnum;
use paramxml_core::{ParameterIdentifier, ParameterLabel, ParameterMapping, ParameterRegistry};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum ExportFormat {
    #[default]
    Json,
    /// label, identifier, created_at; one mapping per line
    Tsv,
}

#[derive(Serialize)]
struct ExportRow<'a> {
    label: &'a str,
    identifier: &'a str,
    created_at: String,
}

pub(crate) fn render_mappings(rows: &[ParameterMapping], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            let rows: Vec<ExportRow<'_>> = rows
                .iter()
                .map(|m| ExportRow {
                    label: m.label.as_str(),
                    identifier: m.identifier.as_str(),
                    created_at: m.created_at.to_rfc3339(),
                })
                .collect();
            Ok(serde_json::to_string_pretty(&rows)?)
        }
        ExportFormat::Tsv => {
            let mut out = String::from("label\tidentifier\tcreated_at\n");
            for m in rows {
                // Labels are free text; keep one row per line.
                let label: String = m
                    .label
                    .as_str()
                    .chars()
                    .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
                    .collect();
                writeln!(out, "{label}\t{}\t{}", m.identifier, m.created_at.to_rfc3339())?;
            }
            Ok(out)
        }
    }
}

/// Write to `out`, or stdout when absent.
pub(crate) fn export_mappings(
    registry: &dyn ParameterRegistry,
    format: ExportFormat,
    out: Option<&Path>,
) -> Result<usize> {
    let rows = registry.mappings()?;
    let text = render_mappings(&rows, format)?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => println!("{}", text.trim_end()),
    }
    Ok(rows.len())
}

pub(crate) fn lookup_label(
    registry: &dyn ParameterRegistry,
    label: &str,
) -> Result<Option<ParameterIdentifier>> {
    Ok(registry.lookup(&ParameterLabel::new(label))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramxml_core::{normalize, MemoryRegistry};
    use tempfile::tempdir;

    fn registry() -> MemoryRegistry {
        let r = MemoryRegistry::default();
        r.register(&ParameterLabel::new("Вес"), normalize("ves")).unwrap();
        r.register(&ParameterLabel::new("Дата\tрождения"), normalize("data"))
            .unwrap();
        r
    }

    #[test]
    fn test_json_export() {
        let r = registry();
        let text = render_mappings(&r.mappings().unwrap(), ExportFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["label"], "Вес");
        assert_eq!(parsed[0]["identifier"], "ves");
        assert_eq!(parsed[1]["identifier"], "data");
    }

    #[test]
    fn test_tsv_export_keeps_rows_on_one_line() {
        let r = registry();
        let text = render_mappings(&r.mappings().unwrap(), ExportFormat::Tsv).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("Дата рождения\tdata\t"));
    }

    #[test]
    fn test_export_to_file_and_lookup() {
        let dir = tempdir().unwrap();
        let r = registry();
        let out = dir.path().join("nested").join("map.json");
        assert_eq!(export_mappings(&r, ExportFormat::Json, Some(&out)).unwrap(), 2);
        assert!(out.exists());

        assert_eq!(lookup_label(&r, "Вес").unwrap(), Some(normalize("ves")));
        assert_eq!(lookup_label(&r, "Рост").unwrap(), None);
    }
}
