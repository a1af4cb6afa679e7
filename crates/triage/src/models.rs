//! These models represent the objects passed around during a request
//!
//! Callers hand us plain text or chat turns with attached media, providers speak
//! their own wire formats, and the pipeline inserts synthetic turns of its own.
//! We always convert into these internal structs at the edges, so they are not
//! an exact match to any single provider's format.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
