pub mod sender;
pub mod subscribers;
