//! Workload generator for the fabric-loadtest framework.
//!
//! This crate provides the [`WorkloadGenerator`] which produces one
//! [`ledger_core::Workload`] per unit of work. Each workload carries an asset
//! id drawn from the operating system's entropy source, so ids never collide
//! across workers or across runs.
//!
//! # Architecture
//!
//! ```text
//! OsRng (or any RngCore)
//!        │
//!        ▼
//! ┌───────────────────┐
//! │ WorkloadGenerator │
//! │                   │
//! │  - rng            │
//! │  - prefix         │
//! │  - generated      │
//! └─────────┬─────────┘
//!           │
//!           ▼
//!  Workload { id: "asset-<32 hex>", color, size, owner, appraised_value }
//! ```
//!
//! # Example
//!
//! ```rust
//! use loadtest_generator::WorkloadGenerator;
//!
//! let mut generator = WorkloadGenerator::new();
//! let workload = generator.generate().unwrap();
//! assert!(workload.id.as_str().starts_with("asset-"));
//! ```

pub mod generator;

// Re-exports for convenience
pub use generator::{GeneratorError, WorkloadGenerator, ASSET_PREFIX, ID_ENTROPY_BYTES};
