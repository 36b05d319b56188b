pub mod alerts;
pub mod api;
pub mod config;
pub mod control;
pub mod discovery;
pub mod ecowitt;
pub mod error;
pub mod forecast;
pub mod history;
pub mod sensors;
pub mod trigger;
pub mod units;

#[cfg(test)]
mod test_support;
