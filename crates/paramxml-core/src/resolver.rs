//! The resolver: raw labels -> ordered identifiers.
//!
//! ```text
//! raw label ──► split ──► sub-label ──► registry.lookup ──► hit ──────────────┐
//!                                          │ miss                             │
//!                                          ▼                                  ▼
//!                            translate ─► normalize ─► registry.register ─► emit
//! ```

use crate::ident::{normalize, ParameterIdentifier, ParameterLabel};
use crate::registry::{ParameterRegistry, RegistryError};
use crate::split::{IdentitySplitter, SplittingStrategy};
use crate::translate::{StrategyError, TranslationStrategy, Transliterator};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Still conflicting after one retry against fresh registry state.
    #[error("registry conflict persisted after retry for label {label:?}: {source}")]
    RegistryConflict {
        label: String,
        #[source]
        source: RegistryError,
    },
    #[error("registry unavailable: {0}")]
    Registry(#[from] RegistryError),
}

/// Non-fatal events recorded while resolving one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveWarning {
    /// The label was skipped and produced no identifier.
    InvalidLabel { label: String },
    /// The configured translator failed; transliteration was used instead.
    TranslationFallback { label: String, reason: String },
    /// The configured splitter failed; the label was kept whole.
    SplitFallback { label: String, reason: String },
}

/// Ordered identifiers for one document plus any warnings raised on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub identifiers: Vec<ParameterIdentifier>,
    pub warnings: Vec<ResolveWarning>,
}

/// Orchestrates splitting, registry lookups and translation.
///
/// Cheap to clone; strategies and registry are shared.
#[derive(Clone)]
pub struct Resolver {
    translator: Arc<dyn TranslationStrategy>,
    splitter: Arc<dyn SplittingStrategy>,
    registry: Arc<dyn ParameterRegistry>,
}

impl Resolver {
    pub fn new(
        translator: Arc<dyn TranslationStrategy>,
        splitter: Arc<dyn SplittingStrategy>,
        registry: Arc<dyn ParameterRegistry>,
    ) -> Self {
        Self {
            translator,
            splitter,
            registry,
        }
    }

    /// Transliteration + identity splitting.
    pub fn with_defaults(registry: Arc<dyn ParameterRegistry>) -> Self {
        Self::new(Arc::new(Transliterator), Arc::new(IdentitySplitter), registry)
    }

    pub fn registry(&self) -> &Arc<dyn ParameterRegistry> {
        &self.registry
    }

    pub fn translator_name(&self) -> &str {
        self.translator.name()
    }

    pub fn splitter_name(&self) -> &str {
        self.splitter.name()
    }

    /// Resolve labels in order; one raw label may expand to several identifiers.
    pub fn resolve_parameters(
        &self,
        raw_labels: &[ParameterLabel],
    ) -> Result<Resolution, ResolveError> {
        let mut resolution = Resolution::default();

        for raw in raw_labels {
            for sub in self.split(raw, &mut resolution.warnings) {
                if let Some(id) = self.resolve_one(&sub, &mut resolution.warnings)? {
                    resolution.identifiers.push(id);
                }
            }
        }

        Ok(resolution)
    }

    fn split(&self, raw: &ParameterLabel, warnings: &mut Vec<ResolveWarning>) -> Vec<ParameterLabel> {
        let reason = match self.splitter.split(raw) {
            Ok(parts) if !parts.is_empty() => return parts,
            Ok(_) => "splitter returned no parts".to_string(),
            Err(err) => err.to_string(),
        };
        tracing::warn!(
            label = %raw,
            splitter = self.splitter.name(),
            reason = %reason,
            "splitting failed, keeping label whole"
        );
        warnings.push(ResolveWarning::SplitFallback {
            label: raw.as_str().to_string(),
            reason,
        });
        vec![raw.clone()]
    }

    fn resolve_one(
        &self,
        label: &ParameterLabel,
        warnings: &mut Vec<ResolveWarning>,
    ) -> Result<Option<ParameterIdentifier>, ResolveError> {
        if let Some(existing) = self.registry.lookup(label)? {
            return Ok(Some(existing));
        }

        let candidate = match self.translate(label, warnings) {
            Some(candidate) => candidate,
            None => return Ok(None),
        };
        let proposed = normalize(&candidate);

        match self.registry.register(label, proposed.clone()) {
            Ok(id) => Ok(Some(id)),
            Err(RegistryError::Conflict { .. }) => {
                tracing::warn!(label = %label, "registry conflict, retrying once");
                if let Some(existing) = self.registry.lookup(label)? {
                    return Ok(Some(existing));
                }
                match self.registry.register(label, proposed) {
                    Ok(id) => Ok(Some(id)),
                    Err(source @ RegistryError::Conflict { .. }) => {
                        Err(ResolveError::RegistryConflict {
                            label: label.as_str().to_string(),
                            source,
                        })
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn translate(
        &self,
        label: &ParameterLabel,
        warnings: &mut Vec<ResolveWarning>,
    ) -> Option<String> {
        match self.translator.resolve(label) {
            Ok(candidate) => Some(candidate),
            Err(StrategyError::InvalidLabel(_)) => {
                tracing::warn!(label = ?label.as_str(), "skipping blank parameter label");
                warnings.push(ResolveWarning::InvalidLabel {
                    label: label.as_str().to_string(),
                });
                None
            }
            Err(err @ StrategyError::Unavailable { .. }) => {
                tracing::warn!(
                    label = %label,
                    error = %err,
                    "translation strategy unavailable, falling back to transliteration"
                );
                warnings.push(ResolveWarning::TranslationFallback {
                    label: label.as_str().to_string(),
                    reason: err.to_string(),
                });
                Transliterator.resolve(label).ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, ParameterMapping};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn labels(parts: &[&str]) -> Vec<ParameterLabel> {
        parts.iter().map(|p| ParameterLabel::new(*p)).collect()
    }

    fn ids(resolution: &Resolution) -> Vec<&str> {
        resolution.identifiers.iter().map(|i| i.as_str()).collect()
    }

    /// Splits by a fixed table, identity otherwise.
    struct TableSplitter(HashMap<&'static str, Vec<&'static str>>);

    impl SplittingStrategy for TableSplitter {
        fn name(&self) -> &str {
            "table"
        }

        fn split(&self, label: &ParameterLabel) -> Result<Vec<ParameterLabel>, StrategyError> {
            Ok(match self.0.get(label.as_str()) {
                Some(parts) => labels(parts),
                None => vec![label.clone()],
            })
        }
    }

    struct FailingSplitter;

    impl SplittingStrategy for FailingSplitter {
        fn name(&self) -> &str {
            "failing"
        }

        fn split(&self, _label: &ParameterLabel) -> Result<Vec<ParameterLabel>, StrategyError> {
            Err(StrategyError::unavailable("failing", "no backend"))
        }
    }

    struct OfflineTranslator;

    impl TranslationStrategy for OfflineTranslator {
        fn name(&self) -> &str {
            "offline"
        }

        fn resolve(&self, _label: &ParameterLabel) -> Result<String, StrategyError> {
            Err(StrategyError::unavailable("offline", "connection refused"))
        }
    }

    /// Always yields the same candidate.
    struct ConstTranslator(&'static str);

    impl TranslationStrategy for ConstTranslator {
        fn name(&self) -> &str {
            "const"
        }

        fn resolve(&self, label: &ParameterLabel) -> Result<String, StrategyError> {
            if label.is_blank() {
                return Err(StrategyError::InvalidLabel(label.as_str().to_string()));
            }
            Ok(self.0.to_string())
        }
    }

    /// Reports a conflict on the first `failures` registrations.
    struct FlakyRegistry {
        inner: MemoryRegistry,
        failures: AtomicUsize,
    }

    impl ParameterRegistry for FlakyRegistry {
        fn lookup(
            &self,
            label: &ParameterLabel,
        ) -> Result<Option<ParameterIdentifier>, RegistryError> {
            self.inner.lookup(label)
        }

        fn register(
            &self,
            label: &ParameterLabel,
            proposed: ParameterIdentifier,
        ) -> Result<ParameterIdentifier, RegistryError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(RegistryError::Conflict {
                    label: label.as_str().to_string(),
                    identifier: proposed,
                });
            }
            self.inner.register(label, proposed)
        }

        fn mappings(&self) -> Result<Vec<ParameterMapping>, RegistryError> {
            self.inner.mappings()
        }
    }

    #[test]
    fn test_scenario_first_and_repeat_resolution() {
        let registry = Arc::new(MemoryRegistry::default());
        let resolver = Resolver::with_defaults(registry.clone());

        let first = resolver.resolve_parameters(&labels(&["Параметр1"])).unwrap();
        assert_eq!(ids(&first), vec!["parametr1"]);
        assert_eq!(registry.len(), 1);

        let second = resolver.resolve_parameters(&labels(&["Параметр1"])).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_scenario_colliding_candidates_get_suffix() {
        let registry = Arc::new(MemoryRegistry::default());
        let resolver = Resolver::new(
            Arc::new(ConstTranslator("Param")),
            Arc::new(IdentitySplitter),
            registry,
        );
        let out = resolver
            .resolve_parameters(&labels(&["Первый", "Второй"]))
            .unwrap();
        assert_eq!(ids(&out), vec!["param", "param_2"]);
    }

    #[test]
    fn test_scenario_split_expands_in_place() {
        let splitter = TableSplitter(HashMap::from([(
            "СкоростьИВремя",
            vec!["Скорость", "Время"],
        )]));
        let registry = Arc::new(MemoryRegistry::default());
        let resolver = Resolver::new(Arc::new(Transliterator), Arc::new(splitter), registry.clone());

        let out = resolver
            .resolve_parameters(&labels(&["Имя", "СкоростьИВремя", "Вес"]))
            .unwrap();
        assert_eq!(ids(&out), vec!["imya", "skorost", "vremya", "ves"]);
        assert_eq!(
            registry.lookup(&ParameterLabel::new("Время")).unwrap().unwrap().as_str(),
            "vremya"
        );
        assert!(registry
            .lookup(&ParameterLabel::new("СкоростьИВремя"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scenario_empty_input() {
        let registry = Arc::new(MemoryRegistry::default());
        let resolver = Resolver::with_defaults(registry.clone());
        let out = resolver.resolve_parameters(&[]).unwrap();
        assert!(out.identifiers.is_empty());
        assert!(out.warnings.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicates_within_document_register_once() {
        let registry = Arc::new(MemoryRegistry::default());
        let resolver = Resolver::with_defaults(registry.clone());
        let out = resolver
            .resolve_parameters(&labels(&["Рост", "Вес", "Рост"]))
            .unwrap();
        assert_eq!(ids(&out), vec!["rost", "ves", "rost"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_blank_label_is_skipped_with_warning() {
        let resolver = Resolver::with_defaults(Arc::new(MemoryRegistry::default()));
        let out = resolver
            .resolve_parameters(&labels(&["Рост", "   ", "Вес"]))
            .unwrap();
        assert_eq!(ids(&out), vec!["rost", "ves"]);
        assert_eq!(
            out.warnings,
            vec![ResolveWarning::InvalidLabel {
                label: "   ".to_string()
            }]
        );
    }

    #[test]
    fn test_unavailable_translator_falls_back() {
        let resolver = Resolver::new(
            Arc::new(OfflineTranslator),
            Arc::new(IdentitySplitter),
            Arc::new(MemoryRegistry::default()),
        );
        let out = resolver.resolve_parameters(&labels(&["Вес"])).unwrap();
        assert_eq!(ids(&out), vec!["ves"]);
        assert!(matches!(
            out.warnings.as_slice(),
            [ResolveWarning::TranslationFallback { .. }]
        ));
    }

    #[test]
    fn test_failing_splitter_fails_closed() {
        let resolver = Resolver::new(
            Arc::new(Transliterator),
            Arc::new(FailingSplitter),
            Arc::new(MemoryRegistry::default()),
        );
        let out = resolver.resolve_parameters(&labels(&["Дата и время"])).unwrap();
        assert_eq!(ids(&out), vec!["data_i_vremya"]);
        assert!(matches!(
            out.warnings.as_slice(),
            [ResolveWarning::SplitFallback { .. }]
        ));
    }

    #[test]
    fn test_conflict_is_retried_once() {
        let registry = Arc::new(FlakyRegistry {
            inner: MemoryRegistry::default(),
            failures: AtomicUsize::new(1),
        });
        let resolver = Resolver::with_defaults(registry);
        let out = resolver.resolve_parameters(&labels(&["Вес"])).unwrap();
        assert_eq!(ids(&out), vec!["ves"]);
    }

    #[test]
    fn test_persistent_conflict_is_fatal_for_document() {
        let registry = Arc::new(FlakyRegistry {
            inner: MemoryRegistry::default(),
            failures: AtomicUsize::new(2),
        });
        let resolver = Resolver::with_defaults(registry);
        let err = resolver.resolve_parameters(&labels(&["Вес"])).unwrap_err();
        assert!(matches!(err, ResolveError::RegistryConflict { .. }));
    }

    #[test]
    fn test_resolution_is_deterministic_for_fixed_state() {
        let input = labels(&["Имя", "Фамилия", "Отчество", "Имя"]);
        let a = Resolver::with_defaults(Arc::new(MemoryRegistry::default()))
            .resolve_parameters(&input)
            .unwrap();
        let b = Resolver::with_defaults(Arc::new(MemoryRegistry::default()))
            .resolve_parameters(&input)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(ids(&a), vec!["imya", "familiya", "otchestvo", "imya"]);
    }
}
