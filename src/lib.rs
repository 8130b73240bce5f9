pub mod catalog;
pub mod error;
pub mod loan;
pub mod order;
pub mod party;
pub mod report;
pub mod service;
pub mod store;
pub mod time;
pub mod utils;
pub mod view;
