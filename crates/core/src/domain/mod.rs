pub mod contract;
pub mod currency;
pub mod error;
pub mod item;
pub mod money;
pub mod query;
pub mod settings;
