//! # parley-shared
//!
//! Pure domain helpers shared by every Parley crate: canonical channel
//! naming and the private-channel access guard, push-topic naming, and
//! unordered-pair normalization.  No I/O lives here.

pub mod channel;
pub mod constants;
pub mod pair;
pub mod topics;
