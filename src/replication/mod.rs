pub mod reports;
pub mod upgrade;
