//! Element system.
//!
//! Elements follow the "sync processing" principle: [`Element::process`] is
//! synchronous and runs on the caller's thread, so element implementations
//! stay simple and deterministic. Scheduling is left to whatever drives the
//! elements.

mod traits;

pub use traits::Element;
