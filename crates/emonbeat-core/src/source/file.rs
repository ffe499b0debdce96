use std::fs::File;
use std::path::{Path, PathBuf};

use super::{PortFactory, SourceError};

/// Reads frames from a file or FIFO instead of a serial device.
///
/// Every cycle reopens the path, so a regular file yields its first line on
/// each cycle while a FIFO yields whatever its writer produces next.
pub struct FilePortFactory {
    path: PathBuf,
}

impl FilePortFactory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PortFactory for FilePortFactory {
    type Port = File;

    fn open(&self) -> Result<Self::Port, SourceError> {
        File::open(&self.path).map_err(|err| SourceError::Open {
            device: self.describe(),
            message: err.to_string(),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::FilePortFactory;
    use crate::source::{PortFactory, SourceError};

    #[test]
    fn missing_file_is_open_error() {
        let factory = FilePortFactory::new("/nonexistent/emonbeat-capture.txt");
        let err = factory.open().unwrap_err();
        assert!(err.is_open_error());
        assert!(matches!(err, SourceError::Open { .. }));
    }
}
