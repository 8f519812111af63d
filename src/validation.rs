use crate::constants::MAX_FILE_SIZE;
use crate::error::{CompressionError, Result};
use std::fs;
use std::path::Path;

/// Validate an input file before it is read into memory
pub fn validate_input_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(CompressionError::FileNotFound(path.to_path_buf()));
    }

    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(CompressionError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        )));
    }

    if metadata.len() > MAX_FILE_SIZE {
        return Err(CompressionError::FileTooLarge(metadata.len(), MAX_FILE_SIZE));
    }

    Ok(())
}

/// Create the output directory if needed and make sure it is a directory
pub fn validate_output_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|_| CompressionError::DirectoryCreationFailed(path.to_path_buf()))?;

    if !path.is_dir() {
        return Err(CompressionError::DirectoryCreationFailed(path.to_path_buf()));
    }
    Ok(())
}
