pub mod capture;
pub mod config;
pub mod database;
pub mod diff;
pub mod monitoring;
pub mod notifications;
pub mod pages;
pub mod pool;
pub mod retention;
pub mod storage;

#[cfg(test)]
mod test_support;
