pub mod config;
pub mod history;
pub mod payload;
pub mod record;
