//! Test utilities for creating, growing and rotating temporary log files.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new, empty temporary log file
    pub fn new() -> std::io::Result<Self> {
        let temp_file = Self::missing()?;
        File::create(&temp_file.path)?;
        Ok(temp_file)
    }

    /// Reserve a log file path inside a temporary directory without creating it
    pub fn missing() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with `content` followed by a newline
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_content(content)?;
        Ok(temp_file)
    }

    /// Create a temporary log file holding exactly `content`
    pub fn with_raw_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_raw(content)?;
        Ok(temp_file)
    }

    /// Append a line to the temporary log file
    pub fn append_content(&self, content: &str) -> std::io::Result<()> {
        self.append_raw(&format!("{}\n", content))
    }

    /// Append bytes exactly as given, creating the file if needed
    pub fn append_raw(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file in place
    pub fn truncate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    /// Move the file aside and create a fresh one holding `content`
    pub fn rotate(&self, content: &str) -> std::io::Result<()> {
        fs::rename(&self.path, self.path.with_extension("log.1"))?;
        let mut file = File::create(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Delete the file
    pub fn remove(&self) -> std::io::Result<()> {
        fs::remove_file(&self.path)
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_missing_file_is_not_created() {
        let temp_file = TempLogFile::missing().unwrap();
        assert!(!temp_file.path().exists());

        temp_file.append_raw("created").unwrap();
        assert_eq!(fs::read_to_string(temp_file.path()).unwrap(), "created");
    }

    #[test]
    fn test_append_content_and_raw() {
        let temp_file = TempLogFile::with_content("line 1").unwrap();
        temp_file.append_raw("par").unwrap();
        temp_file.append_content("tial").unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "line 1\npartial\n");
    }

    #[test]
    fn test_truncate() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.truncate().unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn test_rotate() {
        let temp_file = TempLogFile::with_content("old").unwrap();
        temp_file.rotate("new\n").unwrap();

        assert_eq!(fs::read_to_string(temp_file.path()).unwrap(), "new\n");
        let rotated = temp_file.path().with_extension("log.1");
        assert_eq!(fs::read_to_string(rotated).unwrap(), "old\n");
    }

    #[test]
    fn test_remove() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.remove().unwrap();
        assert!(!temp_file.path().exists());
    }
}
