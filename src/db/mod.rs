pub mod models;
pub mod repository;
mod write;

pub use models::*;
pub use repository::*;
pub use write::{WriteGate, WriteTx};
