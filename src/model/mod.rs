pub mod api_model;
pub mod form;
pub mod schema;
pub mod specification;

pub use api_model::*;
pub use form::*;
pub use schema::*;
pub use specification::*;
