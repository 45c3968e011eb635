//! Ordering properties of join orders.

mod order;
pub use order::*;
mod required;
pub use required::*;
