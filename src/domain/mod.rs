pub mod attempt;
pub mod field;
pub mod hints;
pub mod result;
pub mod target;

pub use attempt::{
    AttemptError, AttemptSummary, ErrorKind, ExtractionAttempt, Outcome, RawFields, StrategyId,
};
pub use field::{required_fields, Field, FieldKind};
pub use hints::ResolveHints;
pub use result::{CanonicalResult, ContentAnalysis, Creator};
pub use target::{ContentType, Platform, Target};
