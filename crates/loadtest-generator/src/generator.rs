//! Workload id generation.

use ledger_core::{LedgerError, Workload, WorkloadId};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Prefix of every generated asset id.
pub const ASSET_PREFIX: &str = "asset-";

/// Random bytes drawn per workload id (128 bits).
pub const ID_ENTROPY_BYTES: usize = 16;

/// Errors that can occur while generating workloads.
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Entropy source unavailable: {0}")]
    Entropy(String),
}

impl From<GeneratorError> for LedgerError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::Entropy(msg) => LedgerError::Entropy(msg),
        }
    }
}

/// Produces uniquely identified workloads.
///
/// Each worker owns its own generator; `OsRng` holds no state, so generators
/// never need to be shared between tasks.
pub struct WorkloadGenerator<R = OsRng> {
    rng: R,
    prefix: String,
    generated: u64,
}

impl WorkloadGenerator<OsRng> {
    /// Create a generator backed by the operating system's entropy source.
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }
}

impl Default for WorkloadGenerator<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore> WorkloadGenerator<R> {
    /// Create a generator drawing from the given RNG.
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            prefix: ASSET_PREFIX.to_string(),
            generated: 0,
        }
    }

    /// Override the id prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Number of ids produced so far.
    pub fn generated(&self) -> u64 {
        self.generated
    }

    /// Draw a fresh workload id.
    pub fn generate_id(&mut self) -> Result<WorkloadId, GeneratorError> {
        let mut bytes = [0u8; ID_ENTROPY_BYTES];
        self.rng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| GeneratorError::Entropy(e.to_string()))?;

        self.generated += 1;
        Ok(WorkloadId::new(format!(
            "{}{}",
            self.prefix,
            hex::encode(bytes)
        )))
    }

    /// Generate the next workload.
    pub fn generate(&mut self) -> Result<Workload, GeneratorError> {
        Ok(Workload::new(self.generate_id()?))
    }
}
