pub mod catalog;
pub mod order_book;
