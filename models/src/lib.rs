// models/src/lib.rs

pub mod dates;
pub mod errors;
pub mod medical;

pub use errors::{DomainError, DomainResult, FieldError, ValidationError, ValidationResult};

pub use medical::{
    AccessPermission,
    AccessType,
    AuditEvent,
    BloodType,
    Doctor,
    DoctorProfileInput,
    Gender,
    Genotype,
    LabTest,
    Laboratory,
    LaboratoryProfileInput,
    MedicalRecord,
    NewUser,
    Patient,
    PatientProfileInput,
    Prescription,
    RecordType,
    Role,
    TestStatus,
    User,
    // Add more here as you expand the medical model set.
};
