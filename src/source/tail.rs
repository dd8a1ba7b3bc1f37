//! Asynchronous JSONL tail reader for the upstream adapter's flow file
//!
//! Yields complete lines only; a partially written line is held back until its
//! newline arrives. A line that is not valid UTF-8 is handed back as an inner
//! error so the caller can count it and keep reading. Rotation (inode change) and truncation (file shorter than
//! the read position) both restart reading from the top of the new file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::sleep;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

pub struct FlowTail {
    path: PathBuf,
    file: Option<BufReader<File>>,
    inode: Option<u64>,
    position: u64,
    partial: Vec<u8>,
    poll_interval: Duration,
    from_beginning: bool,
}

impl FlowTail {
    pub fn new(path: PathBuf, poll_interval: Duration, from_beginning: bool) -> Self {
        Self {
            path,
            file: None,
            inode: None,
            position: 0,
            partial: Vec::new(),
            poll_interval,
            from_beginning,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file, at the end unless reading from the beginning
    pub async fn start(&mut self) -> std::io::Result<()> {
        self.open(!self.from_beginning).await?;
        log::info!(
            "📖 Started tailing: {} (from {})",
            self.path.display(),
            if self.from_beginning { "beginning" } else { "end" }
        );
        Ok(())
    }

    async fn open(&mut self, seek_to_end: bool) -> std::io::Result<()> {
        let file = File::open(&self.path).await?;

        #[cfg(unix)]
        {
            self.inode = Some(file.metadata().await?.ino());
        }

        let mut reader = BufReader::new(file);
        self.position = if seek_to_end {
            reader.seek(SeekFrom::End(0)).await?
        } else {
            0
        };
        self.partial.clear();
        self.file = Some(reader);
        Ok(())
    }

    /// Read the next complete non-empty line, waiting if necessary
    ///
    /// The outer error is an I/O failure on the file; the inner one is a single
    /// line with invalid UTF-8, already consumed.
    pub async fn read_line(&mut self) -> std::io::Result<Result<String, FromUtf8Error>> {
        loop {
            if self.file.is_none() {
                // The file did not exist at start: everything in it is new
                match self.open(false).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        sleep(self.poll_interval).await;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            if self.detect_restart().await? {
                log::info!("🔄 File rotated or truncated, reopening: {}", self.path.display());
                self.open(false).await?;
            }

            let Some(reader) = self.file.as_mut() else {
                continue;
            };

            // Appends into `partial` so an incomplete line survives between polls
            let read = reader.read_until(b'\n', &mut self.partial).await?;
            if read == 0 {
                sleep(self.poll_interval).await;
                continue;
            }
            self.position += read as u64;

            if self.partial.last() != Some(&b'\n') {
                continue;
            }

            let line = match String::from_utf8(std::mem::take(&mut self.partial)) {
                Ok(line) => line,
                Err(e) => return Ok(Err(e)),
            };
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Ok(trimmed.to_string()));
            }
        }
    }

    /// True when the path now points at a different file or a shorter one
    async fn detect_restart(&self) -> std::io::Result<bool> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            // Mid-rotation: keep reading the old handle until the new file appears
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        #[cfg(unix)]
        {
            if self.inode.is_some_and(|old| old != metadata.ino()) {
                return Ok(true);
            }
        }

        Ok(metadata.len() < self.position)
    }
}
