#![deny(
    // This is overly strict, of course. The intent is somewhat of a "quality seal," less to fix everything, and more to force us to add inline allows, which are even more needlessly verbose, but give us a mechanism to say "we think this is okay, but you might want to take a second look here."
    clippy::nursery,
    clippy::pedantic,
    // Every item gets at least a one-line doc, private ones included
    missing_docs,
    clippy::missing_docs_in_private_items,
)]
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]
#![cfg_attr(test, allow(clippy::missing_docs_in_private_items))]

//! # ho-gen – synthetic handover trace generator
//!
//! ho-gen produces per-thread transaction traces for benchmarking sharded systems under cellular
//! mobility: UEs (entities) attach to eNodeBs (access points), both statically partitioned across
//! execution units, and the generator emits activations, deactivations and handovers whose aggregate
//! ratios match the requested targets.
//!
//! ## Pipeline overview
//! 1. Topology ([`Topology::new`](crate::topology::Topology::new)) – derive the static id ranges, the
//!    preset access point of every entity and which entities may migrate; reject bad configurations
//!    before anything is emitted.
//! 2. State ([`EntityStore`](crate::store::EntityStore) and
//!    [`MigrationQueues`](crate::migration::MigrationQueues)) – per-entity state, samplable
//!    active/inactive pools, and the per-unit rings that decide which entity migrates next.
//! 3. Generation ([`TraceGenerator::run`](crate::driver::TraceGenerator::run)) – preset activations,
//!    rate-matched steady state, and a cleanup that returns every entity home and inactive.
//! 4. Output ([`CsvSink`](crate::output::CsvSink)) – one CSV stream per unit plus run metadata.
//!
//! Generation is single-threaded and deterministic for a given seed; independent runs can be produced
//! in parallel.

pub mod config;
pub mod driver;
pub mod migration;
pub mod output;
pub mod sink;
pub mod stats;
pub mod store;
pub mod topology;

pub use config::TraceConfig;
pub use driver::{
    generate,
    TraceGenerator,
};
pub use sink::{
    HandoverKind,
    MemorySink,
    TraceSink,
    TxRecord,
};
pub use stats::TraceStats;
pub use topology::Topology;
