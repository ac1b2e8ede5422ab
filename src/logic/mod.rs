pub mod control;
pub mod form_builder;
pub mod form_tree;
pub mod merge;
pub mod resolve;
pub mod specification_editor;
pub mod specification_overlay;
pub mod validate;

pub use control::*;
pub use form_builder::*;
pub use form_tree::*;
pub use merge::*;
pub use resolve::*;
pub use specification_editor::*;
pub use specification_overlay::*;
pub use validate::*;
