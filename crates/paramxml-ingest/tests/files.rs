use paramxml_ingest::{find_text_files, parse_text_file, IngestError};
use std::fs;

#[test]
fn finds_text_files_recursively_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
    fs::write(dir.path().join("b.txt"), "B\n- x").unwrap();
    fs::write(dir.path().join("a.TXT"), "A\n- x").unwrap();
    fs::write(dir.path().join("nested/deeper/c.txt"), "C\n- x").unwrap();
    fs::write(dir.path().join("notes.md"), "# not a source").unwrap();

    let files = find_text_files(dir.path()).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(names, vec!["a.TXT", "b.txt", "nested/deeper/c.txt"]);
}

#[test]
fn missing_directory_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = find_text_files(&dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, IngestError::NotADirectory { .. }));
}

#[test]
fn parses_file_with_bom() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.txt");
    fs::write(&path, "\u{feff}Паспорт\n- Серия;\n- Номер;\n").unwrap();

    let parsed = parse_text_file(&path).unwrap();
    assert_eq!(parsed.title, "Паспорт");
    assert_eq!(parsed.labels, vec!["Серия", "Номер"]);
}

#[test]
fn rejects_invalid_utf8() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cp1251.txt");
    fs::write(&path, [0xC0, 0xED, 0xEA, 0xE5, 0xF2, 0xE0]).unwrap();

    let err = parse_text_file(&path).unwrap_err();
    assert!(matches!(err, IngestError::Encoding { .. }));
}
