pub mod attachments;
pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod http;
pub mod outbox;
pub mod planning;
pub mod report;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;
pub mod workflow;

pub use error::{ApprovalError, ValidationError};
pub use service::ApprovalService;
pub use store::{ReportStore, SledReportStore};
