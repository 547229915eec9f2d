// Assessment-sheet extraction: a scanned 18 x 20 A/B grid in, a structured table out
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logger;
pub mod ml;
pub mod ocr;
pub mod pipeline;
pub mod reconcile;
pub mod schema;
pub mod table;
pub mod vision;

pub use config::ExtractionConfig;
pub use diagnostics::{DiagnosticSink, DirectorySink};
pub use error::{ExtractionWarning, Result, SheetError};
pub use ml::{AbClassifier, CellClassifier};
pub use ocr::{RecognizedText, TextRecognizer};
pub use pipeline::{Extractor, Strategy};
pub use reconcile::ExtractionSummary;
pub use schema::{SessionValue, SheetIdentity, SkillRow, SESSIONS, SKILL_AREAS};
pub use table::{Envelope, ExtractionResult, Method};
