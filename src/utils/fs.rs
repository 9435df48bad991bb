use std::path::Path;
use tokio::fs;
use tracing::trace;

use crate::error::Error;

/// File system utilities
pub struct FsUtils;

impl FsUtils {
    /// Ensure the directory exists
    pub async fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> Result<(), Error> {
        let path = path.as_ref();

        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path).await?;
        }

        Ok(())
    }

    /// Write to a file (create the directory if it does not exist)
    pub async fn write_file<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<(), Error> {
        let path = path.as_ref();
        let contents = contents.as_ref();
        trace!("Writing {} bytes to file: {}", contents.len(), path.display());

        if let Some(parent) = path.parent() {
            Self::ensure_dir_exists(parent).await?;
        }

        fs::write(path, contents).await?;
        Ok(())
    }

    /// Write a file readable only by its owner, for private keys
    pub async fn write_private_file<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<(), Error> {
        let path = path.as_ref();
        let contents = contents.as_ref();
        trace!("Writing {} private bytes to file: {}", contents.len(), path.display());

        if let Some(parent) = path.parent() {
            Self::ensure_dir_exists(parent).await?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(path).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, contents).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        Ok(())
    }

    /// Read file as a string
    pub async fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String, Error> {
        let path = path.as_ref();
        trace!("Reading file as string: {}", path.display());

        fs::read_to_string(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/file.txt");

        FsUtils::write_file(&path, "hello").await.unwrap();

        assert_eq!(FsUtils::read_to_string(&path).await.unwrap(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("key.pem");

        FsUtils::write_private_file(&path, "secret").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_read_missing_file_names_path() {
        let err = FsUtils::read_to_string("/nonexistent/file.csr").await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/file.csr"));
    }
}
