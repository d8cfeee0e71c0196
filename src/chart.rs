pub mod buffer;
pub mod feed;
pub mod session;
pub mod viewport;
