pub mod cancel;
pub mod identifiers;

pub use cancel::CancelFlag;
pub use identifiers::{ContentHash, TemplateId, TemplateIdError};
