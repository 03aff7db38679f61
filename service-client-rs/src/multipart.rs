//! Multipart file uploads
//!
//! A request whose data carries a `file` field (a path relative to the task
//! file root) is sent as `multipart/form-data`: the file is streamed from disk
//! and the remaining data fields become text parts.

use std::path::{Component, Path, PathBuf};

use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde_json::Value;

use crate::error::{Result, ServiceError};

/// Data field holding the file reference
pub const FILE_FIELD: &str = "file";

/// A file to stream as one multipart part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Form field name
    pub field: String,

    /// Absolute path under the task file root
    pub path: PathBuf,
}

impl FileUpload {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.field.clone())
    }

    /// Open the file as a streaming form part
    pub async fn into_part(self) -> Result<Part> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            ServiceError::io(format!("Unable to open '{}': {}", self.path.display(), e))
        })?;
        let length = file.metadata().await?.len();
        let file_name = self.file_name();

        Ok(Part::stream_with_length(Body::from(file), length).file_name(file_name))
    }
}

/// Remove the file reference from `data`, resolving it under `task_root`.
///
/// Returns `None` when `data` is not an object or carries no file reference.
pub fn take_file_reference(data: &mut Option<Value>, task_root: &Path) -> Result<Option<FileUpload>> {
    let Some(Value::Object(fields)) = data else {
        return Ok(None);
    };
    let Some(reference) = fields.remove(FILE_FIELD) else {
        return Ok(None);
    };

    let relative = reference.as_str().ok_or_else(|| {
        ServiceError::validation(format!("'{}' must be a relative path string", FILE_FIELD))
    })?;

    Ok(Some(FileUpload {
        field: FILE_FIELD.to_string(),
        path: resolve_under(task_root, relative)?,
    }))
}

fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    let escapes = candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if relative.is_empty() || escapes {
        return Err(ServiceError::validation(format!(
            "file reference '{}' must stay inside the task file root",
            relative
        )));
    }
    Ok(root.join(candidate))
}

/// Build the multipart form: text parts for `fields`, then the file part
pub async fn build_form(fields: Option<Value>, file: FileUpload) -> Result<Form> {
    let mut form = Form::new();

    if let Some(Value::Object(fields)) = fields {
        for (name, value) in fields {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            form = form.text(name, text);
        }
    }

    let field = file.field.clone();
    Ok(form.part(field, file.into_part().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_takes_file_reference_out_of_data() {
        let mut data = Some(json!({ "file": "uploads/receipt.pdf", "title": "Receipt" }));
        let upload = take_file_reference(&mut data, Path::new("/tmp")).unwrap().unwrap();

        assert_eq!(upload.path, PathBuf::from("/tmp/uploads/receipt.pdf"));
        assert_eq!(upload.file_name(), "receipt.pdf");
        assert_eq!(data, Some(json!({ "title": "Receipt" })));
    }

    #[test]
    fn test_plain_data_is_untouched() {
        let mut data = Some(json!({ "title": "Receipt" }));
        assert!(take_file_reference(&mut data, Path::new("/tmp")).unwrap().is_none());
        assert_eq!(data, Some(json!({ "title": "Receipt" })));

        let mut none = None;
        assert!(take_file_reference(&mut none, Path::new("/tmp")).unwrap().is_none());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        for bad in ["../etc/passwd", "/etc/passwd", "a/../../b", ""] {
            let mut data = Some(json!({ "file": bad }));
            assert!(
                take_file_reference(&mut data, Path::new("/tmp")).is_err(),
                "{bad} should be rejected"
            );
        }

        let mut data = Some(json!({ "file": 42 }));
        assert!(take_file_reference(&mut data, Path::new("/tmp")).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_fails_to_open() {
        let upload = FileUpload {
            field: FILE_FIELD.to_string(),
            path: PathBuf::from("/definitely/not/here.bin"),
        };
        assert!(matches!(upload.into_part().await, Err(ServiceError::Io(_))));
    }
}
