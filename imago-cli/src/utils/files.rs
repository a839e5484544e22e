use std::path::{Path, PathBuf};

use imago_engine::{Image, key_digest};

use crate::error::AppError;

/// Creates all directories in the given path, including parent directories if they don't exist.
#[inline]
pub async fn create_dirs(path: &Path) -> Result<(), AppError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(AppError::Io)?;
    Ok(())
}

/// Path an image downloaded under `key` is written to.
///
/// The file is named after the digest of the key, so URLs that differ only in
/// characters unsafe for file names still map to distinct files. The extension
/// follows the detected format and falls back to `bin`.
pub fn image_path(output_dir: &Path, key: &str, image: &Image) -> PathBuf {
    let extension = image.format().map(|f| f.extension()).unwrap_or("bin");
    output_dir.join(format!("{}.{extension}", key_digest(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> Image {
        Image::new(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0])
    }

    #[test]
    fn test_image_path_uses_digest_and_extension() {
        let dir = Path::new("/tmp/images");
        let path = image_path(dir, "GET https://example.com/a.png", &png());

        assert_eq!(path.parent(), Some(dir));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        assert_eq!(path.file_stem().and_then(|s| s.to_str()).map(str::len), Some(64));

        let unknown = Image::new(b"plain text".to_vec());
        let path = image_path(dir, "GET https://example.com/a.txt", &unknown);
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("bin"));
    }

    #[tokio::test]
    async fn test_create_dirs_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");

        create_dirs(&nested).await.unwrap();
        create_dirs(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
