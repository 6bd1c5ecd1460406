//! Report assembly.
//!
//! The [`ReportAssembler`] lays the parsed [`Narrative`](crate::narrative::Narrative)
//! out in a fixed section order, attaches the charts the [`ReportSkeleton`]
//! assigns to each section and renders the result twice: Markdown, and a
//! standalone HTML page (`maud`, with the narrative converted by
//! `pulldown-cmark`). Both renderings reference charts by the same relative
//! `plots/<id>.html` path.

mod assembler;
pub mod html;

pub use assembler::{
    AssembledSection, REPORT_TITLE, Report, ReportAssembler, ReportMetadata, ReportSkeleton, SkeletonEntry,
    UNAVAILABLE, ValidationStatus, WriteOutcome,
};
