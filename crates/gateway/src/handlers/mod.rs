//! API handlers module

pub mod books;
pub mod chatbot;
pub mod health;
pub mod images;
pub mod store;
pub mod write_process;
