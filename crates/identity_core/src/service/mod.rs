//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository transactions into use-case level APIs.
//! - Keep CLI and other callers decoupled from storage details.

pub mod identity_service;
