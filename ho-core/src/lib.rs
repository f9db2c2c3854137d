#![deny(
    // Same "quality seal" as the generator crate: pedantic lints are on, and anything we disagree with
    // gets an inline allow so it stands out in review.
    clippy::nursery,
    clippy::pedantic,
    missing_docs,
    clippy::missing_docs_in_private_items,
)]
#![cfg_attr(test, allow(clippy::missing_docs_in_private_items))]

//! Shared building blocks for the handover trace generator: the error taxonomy every generation stage
//! reports through, and the logging setup used by the binaries.

pub mod errors;
pub mod logging;

pub use errors::{
    GenError,
    PoolKind,
};
