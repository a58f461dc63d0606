//! Adapter for the hosted headless CMS.
//!
//! Reads go through GROQ queries (against the CDN host when enabled), writes
//! through transactional mutations against the API host.

mod client;
mod documents;
mod queries;
mod repos;

pub use client::{CmsClient, CmsError, CmsOptions, MutationResponse, MutationResult};
pub use repos::{CmsStore, author_document_id};
