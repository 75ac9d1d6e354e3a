//! Collects a multipart request into text fields and files.

use std::collections::HashMap;

use axum::extract::{Multipart, multipart::MultipartError};
use axum::http::StatusCode;
use tracing::{error, trace, warn};

use crate::error::{AppError, AppResult};
use crate::services::upload::IncomingFile;

/// A fully read multipart form. Repeated fields keep their order; a trailing
/// `[]` on a field name is ignored.
#[derive(Debug, Default)]
pub struct MultipartForm {
    texts: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<IncomingFile>>,
}

impl MultipartForm {
    /// Reads every field. `limit` is only used for the over-limit message.
    ///
    /// File inputs left empty by the browser (no name, no data) are dropped.
    pub async fn read(multipart: &mut Multipart, limit: usize) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            let name = field
                .name()
                .unwrap_or_default()
                .trim_end_matches("[]")
                .to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                    if file_name.is_empty() && data.is_empty() {
                        trace!(field = %name, "Skipping empty file input");
                        continue;
                    }
                    form.files
                        .entry(name)
                        .or_default()
                        .push(IncomingFile::new(file_name, data));
                }
                None => {
                    let text = field.text().await.map_err(|e| multipart_error(e, limit))?;
                    form.texts.entry(name).or_default().push(text);
                }
            }
        }

        Ok(form)
    }

    /// First value of a text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// First value of a text field, trimmed, or `None` if blank.
    pub fn trimmed(&self, name: &str) -> Option<&str> {
        self.text(name).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn texts(&self, name: &str) -> &[String] {
        self.texts.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.texts.contains_key(name) || self.files.contains_key(name)
    }

    pub fn take_files(&mut self, name: &str) -> Vec<IncomingFile> {
        self.files.remove(name).unwrap_or_default()
    }

    pub fn take_file(&mut self, name: &str) -> Option<IncomingFile> {
        self.take_files(name).into_iter().next()
    }
}

fn multipart_error(e: MultipartError, limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(limit, "Request body over limit");
        AppError::PayloadTooLarge { limit }
    } else {
        error!(error = %e, "Error reading multipart form");
        AppError::BadRequest("Invalid multipart data")
    }
}
