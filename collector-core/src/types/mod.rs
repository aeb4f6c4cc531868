pub mod document;
pub mod ids;
pub mod run;

pub use document::{
    CanonicalDocument, ContentTimestampType, DocumentEnrichment, EnrichedDocument, EntitySpan,
    EntityType, ImageAttachment, ImageEnrichment, ImageHash, IngestSubmission,
};
pub use ids::{CollectorId, RunId};
pub use run::{
    DateRange, ItemError, RunConfig, RunMode, RunResponse, RunState, RunStatus, SortOrder, Stats,
    ValidatedRunConfig,
};
