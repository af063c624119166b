pub mod classify;
pub mod export;
pub mod eye;
pub mod ladder;
pub mod parser;
pub mod persistence;
pub mod pipeline;
pub mod plot;
pub mod settings;
pub mod tier;
pub mod timeseries;
pub mod window;
