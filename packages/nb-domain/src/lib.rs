pub mod prompt;
pub mod response;
pub mod revision;
pub mod status;

mod error;

pub use error::FormatError;
