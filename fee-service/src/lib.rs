//! fee-service: fee structures, student dues, payments, receipts and
//! attendance for the training institute portal.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

pub use startup::{AppState, Application};
