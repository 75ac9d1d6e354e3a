//! # Business Logic Services
//!
//! Services encapsulate the domain logic behind the HTTP handlers.
//!
//! ## Available Services
//!
//! - **Storage** (`storage`) - Upload directory usage and the global quota
//! - **Naming** (`naming`) - Filename sanitizing and collision-free name resolution
//! - **Upload** (`upload`) - The write pipeline for photos and album covers
//! - **Catalog** (`catalog`) - Record lookups and writes used by the pipeline
//! - **Access** (`access`) - Album access tokens
//! - **Password** (`password`) - Album password hashing

pub mod access;
pub mod catalog;
pub mod naming;
pub mod password;
pub mod storage;
pub mod upload;
