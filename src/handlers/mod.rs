//! # HTTP Request Handlers
//!
//! Each handler is responsible for processing specific HTTP requests and
//! returning appropriate responses.
//!
//! ## Available Handlers
//!
//! - **Albums** (`albums`) - Album listing, creation, editing, deletion and unlocking
//! - **Photos** (`photos`) - Photo listing, batch upload, captions and deletion, for albums and the single gallery
//! - **Files** (`files`) - Serving stored photos and covers
//! - **Health Check** (`health_check`) - Application health monitoring

mod albums;
mod files;
mod health_check;
mod photos;

pub use albums::*;
pub use files::*;
pub use health_check::*;
pub use photos::*;
