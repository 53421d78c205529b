//! Production-entry forms: schemas, validation and interactive filling

pub mod registry;
pub mod schema;
pub mod validator;
pub mod wizard;

pub use registry::{FormOrigin, FormRegistry, RegistryError};
pub use schema::{Derivation, FieldKind, FieldSpec, FormSchema, Rule, Rules};
pub use validator::{read_values, validate, FormError, Issue, Payload, Violation};
pub use wizard::{describe, FormWizard};
