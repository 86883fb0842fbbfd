// Shared primitives: field elements, errors, metadata tables and time
pub mod primitives;
pub mod error;
pub mod metadata;
pub mod clock;

pub use primitives::*;
pub use error::*;
pub use metadata::*;
pub use clock::*;
