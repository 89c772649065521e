//! paramxml core: parameter identifier resolution
//!
//! Turns human-authored parameter labels (typically Cyrillic) into stable,
//! unique, XML-safe identifiers:
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌────────────┐   ┌────────────┐   ┌──────────┐
//! │ raw labels │──►│ splitter │──►│ translator │──►│ normalizer │──►│ registry │
//! └────────────┘   └──────────┘   └────────────┘   └────────────┘   └──────────┘
//!                                                                       │
//!                                            ordered identifiers ◄──────┘
//! ```
//!
//! ## Key properties
//!
//! - **Stable**: once a label is registered its identifier never changes
//! - **Unique**: distinct labels never share an identifier (`name`, `name_2`, ...)
//! - **Idempotent**: re-processing the same document adds no registry rows
//! - **Pluggable**: translation and splitting are trait objects chosen at start-up

pub mod document;
pub mod ident;
pub mod registry;
pub mod resolver;
pub mod split;
pub mod translate;

pub use document::{Document, XmlError};
pub use ident::{normalize, IdentifierError, ParameterIdentifier, ParameterLabel};
pub use registry::{
    LabelMatching, MemoryRegistry, ParameterMapping, ParameterRegistry, RegistryError,
    RegistryTable,
};
pub use resolver::{Resolution, ResolveError, ResolveWarning, Resolver};
pub use split::{ConjunctionSplitter, IdentitySplitter, SplittingStrategy};
pub use translate::{StrategyError, TranslationStrategy, Transliterator};
