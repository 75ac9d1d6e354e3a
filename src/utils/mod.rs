//! # Utility Modules
//!
//! Helpers shared by the services and handlers.
//!
//! ## Available Utilities
//!
//! - **Constants** (`constant`) - Application-wide configuration constants
//! - **File** (`file`) - Upload validation and upload directory file operations
//! - **Multipart** (`multipart`) - Reading multipart forms into text fields and files

pub mod constant;
pub mod file;
pub mod multipart;
