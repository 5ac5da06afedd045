//! Business logic layer.
//!
//! Pure modules (`automation_engine`, `ai_gate`, `sla`, `lifecycle`,
//! `canned`, `kb`, `app_registry`) hold no I/O. The `*_service` modules
//! talk to the database and other services.

pub mod ai_gate;
pub mod ai_service;
pub mod app_registry;
pub mod automation_engine;
pub mod canned;
pub mod kb;
pub mod lifecycle;
pub mod sla;
pub mod ticket_service;
pub mod webhook_service;
