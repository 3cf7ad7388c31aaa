// storage/src/lib.rs

pub mod memory;
pub mod store;

pub use memory::InMemoryStore;
pub use store::{
    DoctorFilter, HealthStore, LabTestFilter, LaboratoryFilter, MedicalRecordChanges, Page,
    PatientChanges, PermissionFilter, PrescriptionFilter, RecordFilter,
    SystemCounts, UserChanges,
};

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;

/// Enum for the supported storage engine types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEngineType {
    InMemory,
}

impl FromStr for StoreEngineType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inmemory" | "in-memory" | "memory" => Ok(StoreEngineType::InMemory),
            _ => Err(anyhow::anyhow!("Unknown storage engine type: {}", s)),
        }
    }
}

/// Creates a store instance for the selected engine. Relational engines
/// sit behind the same trait and slot in here.
pub fn create_store(engine: StoreEngineType) -> Result<Arc<dyn HealthStore>> {
    match engine {
        StoreEngineType::InMemory => Ok(Arc::new(InMemoryStore::new())),
    }
}
