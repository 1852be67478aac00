//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unsupported PLY header.
    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Failed to load OBJ file: {0}")]
    Obj(#[from] tobj::LoadError),

    /// The file parsed but contained nothing to draw.
    #[error("'{0}' contains no drawable data")]
    Empty(PathBuf),
}

pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ResourceError::InvalidPly("missing magic".to_string());
        assert_eq!(err.to_string(), "Invalid PLY file: missing magic");

        let err = ResourceError::Empty(PathBuf::from("scene.ply"));
        assert_eq!(err.to_string(), "'scene.ply' contains no drawable data");
    }
}
