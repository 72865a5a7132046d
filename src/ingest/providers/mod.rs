// src/ingest/providers/mod.rs
pub mod openweather;
pub mod usgs;

pub use openweather::OpenWeatherFetcher;
pub use usgs::UsgsQuakeFetcher;
