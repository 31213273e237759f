pub mod activity;
pub mod auth;
pub mod init;
pub mod inventory;
pub mod join_requests;
pub mod membership;
pub mod shopping;
