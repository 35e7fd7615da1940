//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle the explorer pipeline, database writes, detection and
//! outbound notifications.

pub mod classifier;
pub mod explorer;
pub mod firm_service;
pub mod incident_service;
pub mod pipeline;
pub mod retry;
pub mod review_service;
pub mod snapshot;
pub mod sync_service;
pub mod webhook_service;
