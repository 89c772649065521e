//! `paramxml convert`: text files -> resolved identifiers -> XML -> sinks.
//!
//! ```text
//! find_text_files ──► parse_text_file ──► Resolver ──► Document::to_xml ──► sinks
//!                                           │                               ├─ DocumentStore (db)
//!                                           └─ registry (store or memory)   └─ XmlFileSink (xml)
//! ```
//!
//! Files are processed in sorted path order. With `--jobs N` (N > 1) they run on
//! a rayon pool; identifiers for labels first seen concurrently then depend on
//! scheduling, while the registry still guarantees uniqueness.

use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use paramxml_core::{
    ConjunctionSplitter, Document, IdentitySplitter, LabelMatching, MemoryRegistry,
    ParameterLabel, ParameterRegistry, ResolveWarning, Resolver, SplittingStrategy,
    TranslationStrategy, Transliterator,
};
use paramxml_ingest::{find_text_files, parse_text_file};
use paramxml_storage::{DocumentSink, DocumentStore, Persisted, StoreConfig, XmlFileSink};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config;
use crate::llm::{ChatBackend, LlmBackend, LlmSplitter, LlmTranslator};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum TranslationChoice {
    /// Deterministic Cyrillic -> Latin transliteration
    #[default]
    Translit,
    /// Ask the configured LLM backend (falls back to transliteration)
    Llm,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum SplittingChoice {
    /// Every label is one parameter
    #[default]
    None,
    /// Split on separators and the conjunction "и"
    Conjunction,
    /// Ask the configured LLM backend (falls back to no split)
    Llm,
}

/// Store location shared by every command that opens the store.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct StoreArgs {
    /// Store directory (env: PARAMXML_DB_DIR, default ./paramxml-db)
    #[arg(long, value_name = "DIR")]
    pub db: Option<PathBuf>,
    /// Compare labels ignoring case and surrounding whitespace.
    /// Fixed for the lifetime of a store.
    #[arg(long)]
    pub case_insensitive_labels: bool,
}

impl StoreArgs {
    pub(crate) fn label_matching(&self) -> LabelMatching {
        if self.case_insensitive_labels {
            LabelMatching::CaseInsensitive
        } else {
            LabelMatching::Exact
        }
    }

    pub(crate) fn store_config(&self) -> Result<StoreConfig> {
        Ok(StoreConfig {
            dir: config::store_dir(self.db.clone())?,
            label_matching: self.label_matching(),
            sync_writes: true,
        })
    }

    pub(crate) fn open(&self) -> Result<DocumentStore> {
        let cfg = self.store_config()?;
        let dir = cfg.dir.clone();
        DocumentStore::open(cfg).with_context(|| format!("failed to open store at {}", dir.display()))
    }
}

#[derive(Debug, Clone, Args)]
pub(crate) struct ConvertArgs {
    /// Directory of `.txt` documents (searched recursively)
    #[arg(value_name = "DIR")]
    pub input: PathBuf,
    #[arg(long, value_enum, default_value_t = TranslationChoice::Translit)]
    pub translation_strategy: TranslationChoice,
    #[arg(long, value_enum, default_value_t = SplittingChoice::None)]
    pub splitting_strategy: SplittingChoice,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Do not persist documents or mappings in the store
    #[arg(long)]
    pub no_db: bool,
    /// Write a standalone `.xml` file per document
    #[arg(long)]
    pub output_xml: bool,
    /// Where to write `.xml` files (default: next to each source file)
    #[arg(long, value_name = "DIR", requires = "output_xml")]
    pub xml_dir: Option<PathBuf>,
    /// Worker threads; 1 keeps processing sequential and reproducible
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,
}

// ============================================================================
// Pipeline
// ============================================================================

pub(crate) struct Pipeline {
    resolver: Resolver,
    sinks: Vec<Arc<dyn DocumentSink>>,
    store: Option<Arc<DocumentStore>>,
}

impl Pipeline {
    pub(crate) fn new(resolver: Resolver, sinks: Vec<Arc<dyn DocumentSink>>) -> Self {
        Self {
            resolver,
            sinks,
            store: None,
        }
    }

    /// Open the store, pick the registry and sinks, and build strategies.
    pub(crate) fn from_args(args: &ConvertArgs) -> Result<Self> {
        if args.no_db && !args.output_xml {
            return Err(anyhow!(
                "nothing to write: --no-db without --output-xml discards every document"
            ));
        }

        let store = if args.no_db {
            None
        } else {
            match args.store.open() {
                Ok(store) => Some(Arc::new(store)),
                Err(err) if args.output_xml => {
                    tracing::warn!(error = %format!("{err:#}"), "store unavailable, writing XML files only");
                    None
                }
                Err(err) => return Err(err),
            }
        };

        let registry: Arc<dyn ParameterRegistry> = match &store {
            Some(store) => store.clone(),
            None => Arc::new(MemoryRegistry::new(args.store.label_matching())),
        };

        let mut sinks: Vec<Arc<dyn DocumentSink>> = Vec::new();
        if let Some(store) = &store {
            sinks.push(store.clone());
        }
        if args.output_xml {
            sinks.push(Arc::new(
                XmlFileSink::new(args.xml_dir.clone()).mirroring(&args.input),
            ));
        }

        let backend = if args.translation_strategy == TranslationChoice::Llm
            || args.splitting_strategy == SplittingChoice::Llm
        {
            let backend = LlmBackend::from_env()?;
            if !backend.is_enabled() {
                tracing::warn!(
                    "no LLM backend configured ({}); LLM strategies will fall back",
                    config::PARAMXML_LLM_BACKEND_ENV
                );
            }
            Some(Arc::new(backend) as Arc<dyn ChatBackend>)
        } else {
            None
        };

        let (translator, splitter) = build_strategies(
            args.translation_strategy,
            args.splitting_strategy,
            backend,
            config::llm_max_attempts()?,
        );

        Ok(Self {
            resolver: Resolver::new(translator, splitter, registry),
            sinks,
            store,
        })
    }

    pub(crate) fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub(crate) fn store(&self) -> Option<&Arc<DocumentStore>> {
        self.store.as_ref()
    }

    pub(crate) fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Convert one file through every sink.
    pub(crate) fn convert_file(&self, path: &Path) -> Result<FileReport> {
        let parsed = parse_text_file(path)?;
        let labels: Vec<ParameterLabel> = parsed.labels.into_iter().map(ParameterLabel::new).collect();

        let resolution = self
            .resolver
            .resolve_parameters(&labels)
            .context("failed to resolve parameters")?;
        let document = Document::new(parsed.title, resolution.identifiers);
        let xml = document.to_xml().context("failed to build XML")?;

        let mut persisted = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let out = sink
                .persist(path, &document, &xml)
                .with_context(|| format!("{} sink failed", sink.name()))?;
            persisted.push(out);
        }

        tracing::debug!(
            file = %path.display(),
            parameters = document.parameters.len(),
            warnings = resolution.warnings.len(),
            "converted document"
        );
        Ok(FileReport {
            source: path.to_path_buf(),
            parameters: document.parameters.len(),
            warnings: resolution.warnings,
            persisted,
        })
    }

    /// Convert every text file under `dir`. Per-file failures are collected.
    pub(crate) fn convert_dir(&self, dir: &Path, jobs: usize) -> Result<RunSummary> {
        let files = find_text_files(dir)?;
        tracing::info!(
            dir = %dir.display(),
            files = files.len(),
            translation = self.resolver.translator_name(),
            splitting = self.resolver.splitter_name(),
            "converting documents"
        );

        let outcomes: Vec<(PathBuf, Result<FileReport>)> = if jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .context("failed to build worker pool")?;
            pool.install(|| {
                files
                    .par_iter()
                    .map(|f| (f.clone(), self.convert_file(f)))
                    .collect()
            })
        } else {
            files
                .iter()
                .map(|f| (f.clone(), self.convert_file(f)))
                .collect()
        };

        let mut summary = RunSummary::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(report) => summary.reports.push(report),
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %format!("{err:#}"), "document failed");
                    summary.failed.push((path, format!("{err:#}")));
                }
            }
        }
        Ok(summary)
    }
}

fn build_strategies(
    translation: TranslationChoice,
    splitting: SplittingChoice,
    backend: Option<Arc<dyn ChatBackend>>,
    max_attempts: u32,
) -> (Arc<dyn TranslationStrategy>, Arc<dyn SplittingStrategy>) {
    let translator: Arc<dyn TranslationStrategy> = match (translation, &backend) {
        (TranslationChoice::Llm, Some(b)) => Arc::new(LlmTranslator::new(b.clone(), max_attempts)),
        _ => Arc::new(Transliterator),
    };
    let splitter: Arc<dyn SplittingStrategy> = match (splitting, &backend) {
        (SplittingChoice::Llm, Some(b)) => Arc::new(LlmSplitter::new(b.clone(), max_attempts)),
        (SplittingChoice::Conjunction, _) => Arc::new(ConjunctionSplitter),
        _ => Arc::new(IdentitySplitter),
    };
    (translator, splitter)
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug)]
pub(crate) struct FileReport {
    pub source: PathBuf,
    pub parameters: usize,
    pub warnings: Vec<ResolveWarning>,
    pub persisted: Vec<Persisted>,
}

#[derive(Debug, Default)]
pub(crate) struct RunSummary {
    pub reports: Vec<FileReport>,
    pub failed: Vec<(PathBuf, String)>,
}

impl RunSummary {
    pub(crate) fn processed(&self) -> usize {
        self.reports.len()
    }

    pub(crate) fn warnings(&self) -> usize {
        self.reports.iter().map(|r| r.warnings.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn args(input: &Path) -> ConvertArgs {
        ConvertArgs {
            input: input.to_path_buf(),
            translation_strategy: TranslationChoice::Translit,
            splitting_strategy: SplittingChoice::None,
            store: StoreArgs::default(),
            no_db: false,
            output_xml: false,
            xml_dir: None,
            jobs: 1,
        }
    }

    fn write_inputs(dir: &Path) {
        fs::write(dir.join("a.txt"), "Анкета\n- ФИО\n- Дата рождения\n").unwrap();
        fs::write(dir.join("b.txt"), "Заявка\n- ФИО;\n- Адрес.\n").unwrap();
        fs::write(dir.join("empty.txt"), "  \n").unwrap();
    }

    #[test]
    fn test_convert_dir_writes_store_and_xml() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("in");
        fs::create_dir_all(&input).unwrap();
        write_inputs(&input);

        let mut a = args(&input);
        a.store.db = Some(tmp.path().join("db"));
        a.output_xml = true;
        a.xml_dir = Some(tmp.path().join("xml"));

        let pipeline = Pipeline::from_args(&a).unwrap();
        assert_eq!(pipeline.sink_names(), vec!["db", "xml"]);
        let summary = pipeline.convert_dir(&input, a.jobs).unwrap();

        assert_eq!(summary.processed(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].0.ends_with("empty.txt"));

        let xml = fs::read_to_string(tmp.path().join("xml").join("a.xml")).unwrap();
        assert_eq!(
            xml,
            "<document>\n    <fio></fio>\n    <data_rozhdeniya></data_rozhdeniya>\n</document>"
        );
        let xml = fs::read_to_string(tmp.path().join("xml").join("b.xml")).unwrap();
        assert!(xml.contains("<fio></fio>"));
        assert!(xml.contains("<adres></adres>"));

        let store = pipeline.store().unwrap();
        assert_eq!(store.documents().len(), 2);
        assert_eq!(store.parameter_count(), 3);
    }

    #[test]
    fn test_rerun_reuses_identifiers() {
        let tmp = tempdir().unwrap();
        write_inputs(tmp.path());
        let mut a = args(tmp.path());
        a.store.db = Some(tmp.path().join("db"));

        Pipeline::from_args(&a)
            .unwrap()
            .convert_dir(tmp.path(), 1)
            .unwrap();
        let pipeline = Pipeline::from_args(&a).unwrap();
        pipeline.convert_dir(tmp.path(), 1).unwrap();

        let store = pipeline.store().unwrap();
        assert_eq!(store.parameter_count(), 3);
        assert_eq!(store.documents().len(), 4);
    }

    #[test]
    fn test_store_failure_falls_back_to_xml() {
        let tmp = tempdir().unwrap();
        write_inputs(tmp.path());
        // A regular file where the store directory should be.
        let blocker = tmp.path().join("db");
        fs::write(&blocker, "not a directory").unwrap();

        let mut a = args(tmp.path());
        a.store.db = Some(blocker.clone());
        assert!(Pipeline::from_args(&a).is_err());

        a.output_xml = true;
        let pipeline = Pipeline::from_args(&a).unwrap();
        assert!(pipeline.store().is_none());
        assert_eq!(pipeline.sink_names(), vec!["xml"]);
        let summary = pipeline.convert_dir(tmp.path(), 1).unwrap();
        assert_eq!(summary.processed(), 2);
        assert!(tmp.path().join("a.xml").exists());
    }

    #[test]
    fn test_xml_dir_keeps_same_named_files_apart() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("in");
        for sub in ["a", "b"] {
            fs::create_dir_all(input.join(sub)).unwrap();
            fs::write(input.join(sub).join("form.txt"), format!("Т\n- Поле {sub}\n")).unwrap();
        }
        let mut a = args(&input);
        a.no_db = true;
        a.output_xml = true;
        a.xml_dir = Some(tmp.path().join("out"));

        let summary = Pipeline::from_args(&a).unwrap().convert_dir(&input, 1).unwrap();
        assert_eq!(summary.processed(), 2);
        let xml_a = fs::read_to_string(tmp.path().join("out/a/form.xml")).unwrap();
        let xml_b = fs::read_to_string(tmp.path().join("out/b/form.xml")).unwrap();
        assert!(xml_a.contains("<pole_a></pole_a>"));
        assert!(xml_b.contains("<pole_b></pole_b>"));
    }

    #[test]
    fn test_no_sinks_is_rejected() {
        let tmp = tempdir().unwrap();
        let mut a = args(tmp.path());
        a.no_db = true;
        assert!(Pipeline::from_args(&a).is_err());
    }

    #[test]
    fn test_parallel_run_keeps_identifiers_unique() {
        let tmp = tempdir().unwrap();
        for i in 0..8 {
            fs::write(
                tmp.path().join(format!("doc{i}.txt")),
                format!("Документ {i}\n- Вес\n- Рост\n- Поле {i}\n"),
            )
            .unwrap();
        }
        let mut a = args(tmp.path());
        a.no_db = true;
        a.output_xml = true;
        a.xml_dir = Some(tmp.path().join("out"));
        a.jobs = 4;

        let pipeline = Pipeline::from_args(&a).unwrap();
        let summary = pipeline.convert_dir(tmp.path(), a.jobs).unwrap();
        assert_eq!(summary.processed(), 8);
        assert!(summary.failed.is_empty());

        let mappings = pipeline.resolver().registry().mappings().unwrap();
        assert_eq!(mappings.len(), 10);
        let mut idents: Vec<_> = mappings.iter().map(|m| m.identifier.clone()).collect();
        idents.sort();
        idents.dedup();
        assert_eq!(idents.len(), 10);
    }

    #[test]
    fn test_conjunction_splitting() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "Т\n- Скорость и время\n").unwrap();
        let mut a = args(tmp.path());
        a.no_db = true;
        a.output_xml = true;
        a.splitting_strategy = SplittingChoice::Conjunction;

        let pipeline = Pipeline::from_args(&a).unwrap();
        let summary = pipeline.convert_dir(tmp.path(), 1).unwrap();
        assert_eq!(summary.reports[0].parameters, 2);
        let xml = fs::read_to_string(tmp.path().join("a.xml")).unwrap();
        assert!(xml.contains("<skorost></skorost>"));
        assert!(xml.contains("<vremya></vremya>"));
    }

    #[test]
    fn test_pipeline_with_custom_registry() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "Т\n- Параметр1\n- Параметр1\n").unwrap();
        let resolver = Resolver::with_defaults(Arc::new(MemoryRegistry::default()));
        let pipeline = Pipeline::new(resolver, vec![Arc::new(XmlFileSink::new(None))]);
        let report = pipeline.convert_file(&tmp.path().join("a.txt")).unwrap();
        assert_eq!(report.parameters, 2);
        assert_eq!(
            fs::read_to_string(tmp.path().join("a.xml")).unwrap(),
            "<document>\n    <parametr1></parametr1>\n    <parametr1></parametr1>\n</document>"
        );
    }
}
