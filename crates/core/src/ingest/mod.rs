pub mod alpha_vantage;
pub mod error;
pub mod finnhub;
pub mod http;
pub mod provider;
pub mod yahoo;
