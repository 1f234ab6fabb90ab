pub mod symptom;
pub mod vital_sign;

pub use symptom::SymptomRecord;
pub use vital_sign::VitalSignRecord;
