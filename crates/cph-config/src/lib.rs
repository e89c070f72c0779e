//! Config Graph (C1) and Template Expander (C2): loads the layered
//! configuration and exposes `{name}` / glob expansion.

pub mod defaults;
pub mod graph;
pub mod load;
pub mod merge;
pub mod paths;
pub mod template;

pub use graph::{ConfigGraph, ConfigNode, ConfigValue, TypeTag};
pub use load::load_config_graph;
pub use template::{expand, expand_file_pattern};
