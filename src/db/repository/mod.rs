pub mod activity;
pub mod join_request;
pub mod pantry;
pub mod pantry_item;
pub mod shopping;
pub mod user;

pub use activity::ActivityRepository;
pub use join_request::JoinRequestRepository;
pub use pantry::PantryRepository;
pub use pantry_item::PantryItemRepository;
pub use shopping::ShoppingRepository;
pub use user::UserRepository;
