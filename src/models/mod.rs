//! Data types shared across the pipeline.
//!
//! - `object`: Object, Origin, Metadata handed back to the host
//! - `options`: LoadOptions map and the typed GitLoadOptions parsed from it

pub mod object;
pub mod options;

pub use object::*;
pub use options::*;
