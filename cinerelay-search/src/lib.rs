//! Cinerelay Search - Pass-through metadata lookups
//!
//! Forwards search, item info and trending requests to the upstream catalog
//! and returns its JSON untouched. Successful answers are kept in an
//! injectable cache; the streaming path never goes through this crate.

pub mod cache;
pub mod errors;
pub mod lookup;

pub use cache::{MetadataCache, TtlCache};
pub use errors::MetadataError;
pub use lookup::MetadataLookup;

/// Convenience type alias for Results with MetadataError.
pub type Result<T> = std::result::Result<T, MetadataError>;
