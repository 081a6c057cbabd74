pub mod currency;
pub mod order_book;
pub mod pending_retry;
pub mod security;
pub mod trade;
