//! Physical building blocks chosen by the search: join strategies, access paths and the row
//! source nodes they finally turn into.

mod access_path;
pub use access_path::*;
mod join;
pub use join::*;
mod node;
pub use node::*;
