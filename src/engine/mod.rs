pub mod lifecycle;
pub mod location;
pub mod rooms;
pub mod session;
