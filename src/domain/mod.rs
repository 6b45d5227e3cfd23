pub mod error;
pub mod value;

pub use error::DomainError;
pub use value::{Document, DocumentId, ID_FIELD, Pattern, Value};
