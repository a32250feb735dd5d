//! Loading of external files: shader text, image bytes and decoded images.

use std::{
    io,
    path::{Path, PathBuf},
};

use crate::error::RenderError;

pub mod texture;

fn map_io(path: &Path, err: io::Error) -> RenderError {
    match err.kind() {
        io::ErrorKind::NotFound => RenderError::AssetNotFound {
            path: path.to_path_buf(),
        },
        _ => RenderError::Io(err),
    }
}

/// Relative paths resolve against the working directory.
fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        Path::new("./").join(path)
    }
}

pub fn load_string(path: impl AsRef<Path>) -> Result<String, RenderError> {
    let path = resolve(path.as_ref());
    std::fs::read_to_string(&path).map_err(|e| map_io(&path, e))
}

pub fn load_binary(path: impl AsRef<Path>) -> Result<Vec<u8>, RenderError> {
    let path = resolve(path.as_ref());
    std::fs::read(&path).map_err(|e| map_io(&path, e))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let err = load_string("definitely/not/here.wgsl").unwrap_err();
        assert!(matches!(err, RenderError::AssetNotFound { .. }), "{err}");
    }

    #[test]
    fn reads_text_and_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"@vertex fn main() {}").unwrap();
        assert_eq!(load_string(file.path()).unwrap(), "@vertex fn main() {}");
        assert_eq!(load_binary(file.path()).unwrap().len(), 20);
    }
}
