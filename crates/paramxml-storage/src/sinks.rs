//! Document sinks: where converted documents end up.

use crate::{DocumentStore, StoreError};
use paramxml_core::Document;
use std::path::{Path, PathBuf};

/// What a sink produced for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    /// Row id in the documents table
    Row(u64),
    /// Written XML file
    File(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait DocumentSink: Send + Sync {
    fn name(&self) -> &str;

    /// `source` is the text file the document was converted from.
    fn persist(&self, source: &Path, document: &Document, xml: &str)
        -> Result<Persisted, SinkError>;
}

impl DocumentSink for DocumentStore {
    fn name(&self) -> &str {
        "db"
    }

    fn persist(&self, source: &Path, document: &Document, xml: &str) -> Result<Persisted, SinkError> {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        let record = self.save_document(&filename, document, xml)?;
        Ok(Persisted::Row(record.id))
    }
}

/// Writes `<stem>.xml` into `out_dir`, or next to the source file.
///
/// With an input root set, sources below it keep their relative
/// subdirectory under `out_dir`, so `a/form.txt` and `b/form.txt` land in
/// `out/a/form.xml` and `out/b/form.xml`.
#[derive(Debug, Clone, Default)]
pub struct XmlFileSink {
    out_dir: Option<PathBuf>,
    input_root: Option<PathBuf>,
}

impl XmlFileSink {
    pub fn new(out_dir: Option<PathBuf>) -> Self {
        Self {
            out_dir,
            input_root: None,
        }
    }

    pub fn mirroring(mut self, input_root: impl Into<PathBuf>) -> Self {
        self.input_root = Some(input_root.into());
        self
    }

    pub fn target_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let file_name = format!("{stem}.xml");
        let Some(dir) = &self.out_dir else {
            return source.with_file_name(file_name);
        };
        let relative_dir = self
            .input_root
            .as_deref()
            .and_then(|root| source.strip_prefix(root).ok())
            .and_then(Path::parent)
            .filter(|sub| !sub.as_os_str().is_empty());
        match relative_dir {
            Some(sub) => dir.join(sub).join(file_name),
            None => dir.join(file_name),
        }
    }
}

impl DocumentSink for XmlFileSink {
    fn name(&self) -> &str {
        "xml"
    }

    fn persist(&self, source: &Path, _document: &Document, xml: &str) -> Result<Persisted, SinkError> {
        let path = self.target_path(source);
        let write = |path: &Path| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, xml)
        };
        write(&path).map_err(|err| SinkError::Write {
            path: path.clone(),
            source: err,
        })?;
        tracing::debug!(path = %path.display(), "wrote xml file");
        Ok(Persisted::File(path))
    }
}
