pub mod currency_exchange;
pub mod fail_safe;
pub mod order_book_validator;
pub mod reference_price;
pub mod trade_execution;
pub mod trade_execution_error;
pub mod trade_safety;
