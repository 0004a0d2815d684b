pub mod cleanup;
pub mod health;
pub mod reports;
pub mod runs;
pub mod trends;
pub mod upload;
