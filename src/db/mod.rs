// Re-export the Database struct and other public items
mod article;
pub mod core;
mod interaction;
mod schema;

pub use self::core::Database;
