pub mod broker;
pub mod market_data;
pub mod portfolio;
pub mod retry_store;
pub mod settings;
