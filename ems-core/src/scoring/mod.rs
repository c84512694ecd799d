pub mod arbitrage_scorer;
