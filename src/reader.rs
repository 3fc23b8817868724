//! Snapshot reads of the last lines of a file.

use crate::decoder::decode_line;
use crate::error::Result;
use std::fs::Metadata;
use std::io::{self, ErrorKind, SeekFrom};
use std::mem;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Reads the trailing lines of a file by seeking backward from its end.
///
/// Memory use is bounded by the block size and the length of the lines being
/// returned, never by the size of the file.
#[derive(Debug, Clone, Copy)]
pub struct LastLinesReader {
    block_size: usize,
}

impl LastLinesReader {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns up to `n` lines from the end of `path`, oldest first.
    ///
    /// A missing or empty file yields no lines. Every call opens its own
    /// handle, so it never disturbs the tail loop's read position.
    pub async fn read_last_lines<P: AsRef<Path>>(&self, path: P, n: usize) -> Result<Vec<String>> {
        read_last_lines(path.as_ref(), n, self.block_size).await
    }
}

impl Default for LastLinesReader {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BLOCK_SIZE)
    }
}

async fn read_last_lines(path: &Path, n: usize, block_size: usize) -> Result<Vec<String>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata().await?;
    ensure_not_directory(&metadata, path)?;

    let file_len = metadata.len();
    if file_len == 0 {
        return Ok(Vec::new());
    }

    let mut buffer = vec![0u8; block_size];
    // Newest first until the final reverse
    let mut lines = Vec::new();
    // Bytes of the line being assembled, in reverse order
    let mut current = Vec::new();
    let mut position = file_len;
    let mut at_last_byte = true;

    'blocks: while position > 0 {
        let to_read = block_len(position, block_size);
        let start = position - to_read as u64;

        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut buffer[..to_read]).await?;
        position = start;

        for &byte in buffer[..to_read].iter().rev() {
            // A newline ending the file terminates the last line, it does not start an empty one
            if mem::take(&mut at_last_byte) && byte == b'\n' {
                continue;
            }
            if byte == b'\n' {
                lines.push(finish_reversed_line(&mut current));
                if lines.len() >= n {
                    break 'blocks;
                }
            } else {
                current.push(byte);
            }
        }
    }

    if lines.len() < n {
        lines.push(finish_reversed_line(&mut current));
    }

    lines.reverse();
    Ok(lines)
}

/// Opening a directory succeeds on some platforms; reading it never does.
pub(crate) fn ensure_not_directory(metadata: &Metadata, path: &Path) -> Result<()> {
    if metadata.is_dir() {
        return Err(io::Error::new(
            ErrorKind::IsADirectory,
            format!("{} is a directory", path.display()),
        )
        .into());
    }
    Ok(())
}

/// Size of the next backward read given the unread prefix length.
fn block_len(position: u64, block_size: usize) -> usize {
    position.min(block_size as u64) as usize
}

fn finish_reversed_line(current: &mut Vec<u8>) -> String {
    let mut bytes = mem::take(current);
    bytes.reverse();
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    decode_line(&bytes)
}
