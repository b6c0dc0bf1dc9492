pub mod db;
pub mod memory;
pub mod models;
pub mod repositories;

pub use db::connect;
pub use sqlx;
