pub mod purchases;
pub mod users;
pub mod wallet;
