#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` see every row type.

pub mod activity;
pub mod join_request;
pub mod pantry;
pub mod pantry_item;
pub mod shopping_item;
pub mod user;

pub use self::activity::*;
pub use self::join_request::*;
pub use self::pantry::*;
pub use self::pantry_item::*;
pub use self::shopping_item::*;
pub use self::user::*;
