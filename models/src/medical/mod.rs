pub mod access_permission;
pub mod audit_event;
pub mod doctor;
pub mod laboratory;
pub mod medical_record;
pub mod patient;
pub mod prescription;
pub mod role;
pub mod user;

pub use access_permission::{AccessPermission, AccessType};
pub use audit_event::AuditEvent;
pub use doctor::{Doctor, DoctorProfileInput};
pub use lab_test::{LabTest, TestStatus};
pub use laboratory::{Laboratory, LaboratoryProfileInput};
pub use medical_record::{MedicalRecord, RecordType};
pub use patient::{BloodType, Gender, Genotype, Patient, PatientProfileInput, validate_emergency_code};
pub use prescription::Prescription;
pub use role::Role;
pub use user::{NewUser, User};
