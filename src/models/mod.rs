//! Domain models for Granted.
//!
//! # Core Concepts
//!
//! - [`Project`]: A grant proposal, the top-level container.
//! - [`Session`]: A drafting session inside a project. Everything below hangs off it.
//! - [`Source`]: Reference material (the RFP, org documents) stored as text.
//! - [`RfpFact`]: A structured fact bound to a catalog slot, with confidence and evidence.
//! - [`Draft`]: The current markdown of one proposal section.
//! - [`CoverageSnapshot`]: Section-by-section status and an overall score.
//! - [`Job`]: Background work (normalize, autodraft, discover) claimed by the worker.
//! - [`DiscoveredDod`]: A checklist derived from the RFP that replaces the built-in catalog.

mod coverage;
mod dod;
mod draft;
mod fact;
mod job;
mod project;
mod session;
mod snapshot;
mod source;

pub use coverage::*;
pub use dod::*;
pub use draft::*;
pub use fact::*;
pub use job::*;
pub use project::*;
pub use session::*;
pub use snapshot::*;
pub use source::*;
