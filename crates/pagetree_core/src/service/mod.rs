//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep transport/host layers decoupled from storage details.

pub mod document_service;
mod patch_error;
mod patch_ops;
pub mod patch_service;

pub use patch_error::PatchError;
