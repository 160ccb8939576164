//! I/O errors raised while hashing local files or writing downloaded images

use std::path::{Path, PathBuf};
use thiserror::Error;

/// I/O error with the path it concerns
#[derive(Error, Debug)]
#[error("{}", describe(self))]
pub struct IoError {
    pub kind: IoErrorKind,
    pub path: Option<PathBuf>,
    #[source]
    pub source: Option<std::io::Error>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoErrorKind {
    FileNotFound,
    PermissionDenied,
    Other,
}

impl IoError {
    /// The file a command refers to is gone
    pub fn file_not_found(path: &Path) -> Self {
        Self {
            kind: IoErrorKind::FileNotFound,
            path: Some(path.to_path_buf()),
            source: None,
        }
    }

    /// Wrap a standard I/O error, keeping its broad category
    pub fn from_std(source: std::io::Error) -> Self {
        let kind = match source.kind() {
            std::io::ErrorKind::NotFound => IoErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => IoErrorKind::PermissionDenied,
            _ => IoErrorKind::Other,
        };
        Self {
            kind,
            path: None,
            source: Some(source),
        }
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }
}

fn describe(error: &IoError) -> String {
    let subject = error
        .path
        .as_ref()
        .map(|p| format!(": {}", p.display()))
        .unwrap_or_default();
    match (&error.kind, &error.source) {
        (IoErrorKind::FileNotFound, _) => format!("File not found{subject}"),
        (IoErrorKind::PermissionDenied, _) => format!("Permission denied{subject}"),
        (IoErrorKind::Other, Some(source)) => format!("I/O error{subject}: {source}"),
        (IoErrorKind::Other, None) => format!("I/O error{subject}"),
    }
}
