//! Digest computation and staleness classification.
//!
//! Every spec gets a content fingerprint covering its own declaration and,
//! transitively, everything it depends on; units aggregate their specs'
//! fingerprints. Comparing against the persisted fingerprint store decides
//! what actually regenerates.

pub mod digest;
pub mod error;
pub mod stale;
pub mod store;

pub use digest::*;
pub use error::*;
pub use stale::*;
pub use store::*;
