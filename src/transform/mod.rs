//! Reshaping of the raw export into the canonical warehouse layout:
//! quote-artifact stripping, canonical renames, derived columns.

mod normalize;
mod table;

pub use normalize::{normalize, strip_quote_artifact, TIMESTAMP_FORMAT};
pub use table::Table;
