//! Tool system: declarations, argument access, validation, and handlers.

pub mod arguments;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use tool::{FnTool, Tool, ToolContext};
pub use types::{ParameterBuilder, ToolParameters, ToolSpec};
pub use validation::validate_arguments;
