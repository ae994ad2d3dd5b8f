pub mod types;
pub use types::*;
pub mod catalog;
pub use catalog::*;
