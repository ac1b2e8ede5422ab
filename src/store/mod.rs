pub mod http;
pub mod memory;
pub mod model_cache;
pub mod nested_registry;
pub mod traits;

pub use http::*;
pub use memory::*;
pub use model_cache::*;
pub use nested_registry::*;
pub use traits::*;
