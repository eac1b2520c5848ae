pub mod analyzer;
pub mod rules;
pub mod types;
pub mod watchlist;
