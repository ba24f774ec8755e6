//! Context packages for ticket generation: assembly, budgeting, quality
//! scoring, and the ticket prompt/response shape.

pub mod assembler;
pub mod deduplication;
pub mod pruner;
pub mod quality;
pub mod ticket;
pub mod types;

pub use assembler::{
    assemble, assemble_concurrent, render_template, CancellationFlag, ContextAssembler,
};
pub use deduplication::DeduplicationEngine;
pub use pruner::PayloadPruner;
pub use quality::{score, ContextQualityReport, LowQualityWarning, QualityScorer};
pub use ticket::{
    generate_ticket, parse_effort, parse_ticket, render_prompt, Ticket, TicketBackend,
    FIBONACCI_POINTS,
};
pub use types::{
    CallerMetadata, ContextDraft, ContextPackage, ErrorDescriptor, PackageOutcome,
    StructureSummary, StyleUsage, Truncation, TRUNCATION_MARKER,
};
