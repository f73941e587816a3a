pub mod format;
pub mod metadata;
pub mod model;
pub mod placeholder;
pub mod profile;
pub mod scanner;
pub mod validation;

pub use format::DocumentFormat;
pub use metadata::DocumentTags;
pub use model::{FormatProfile, Placeholder, PlaceholderPosition, Section, StructuralModel};
pub use placeholder::{DelimiterGrammar, Extraction, ParseWarning, PlaceholderExtractor};
pub use profile::FormatPatternAnalyzer;
pub use scanner::{DocumentScanner, ScanError, ScanReport};
pub use validation::{TemplateValidator, ValidationIssue};
