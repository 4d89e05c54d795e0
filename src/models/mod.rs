pub mod courier;
pub mod events;
pub mod order;
pub mod position;
pub mod user;
