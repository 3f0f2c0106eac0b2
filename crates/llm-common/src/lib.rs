pub mod error;
pub mod messages;
