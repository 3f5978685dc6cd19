pub mod catalog;
pub mod error;
pub mod prices;
pub mod types;
pub mod wallet;
