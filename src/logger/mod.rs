//! Structured audit logging: every decision, one record.

pub mod audit;
