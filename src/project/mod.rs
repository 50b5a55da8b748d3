pub mod edit;
pub mod export;
pub mod model;
pub mod store;

pub use edit::{Edit, EditError};
pub use model::*;
pub use store::ProjectStore;
