//! Domain types and persistence for DealSprints and OKC Pulse.
//!
//! The web server and the scraper both talk to storage through the traits
//! in [`store`]. [`postgres::PgStore`] is the production implementation;
//! [`memory::MemoryStore`] backs tests and local development.

pub mod defs;
pub mod memory;
pub mod postgres;
pub mod store;

pub use defs::*;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{
    AssessmentStore, LeadNoteStore, MemberStore, PostQuery, PostStore, PostUpdate, RateLimitStore,
    Store,
};
