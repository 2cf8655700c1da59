// Follows the php-fpm access log like `tail -F`: reads appended lines, reopens
// the path after rotation (new inode) or truncation (file shrank).

use futures_util::Stream;
use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FollowerConfig {
    /// How long to sleep at EOF before checking for new data or rotation.
    pub poll_interval: Duration,
    /// Start at offset 0 (ingest existing content) instead of the end.
    pub from_start: bool,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            from_start: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    #[error("cannot open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("log file {} is not a regular file", path.display())]
    NotAFile { path: PathBuf },
}

/// Identity of the file behind the path; a change means the log was rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[cfg(unix)]
    fn of(meta: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_meta: &Metadata) -> Option<Self> {
        None
    }
}

pub struct LogFollower {
    path: PathBuf,
    config: FollowerConfig,
    reader: Option<BufReader<File>>,
    file_id: Option<FileId>,
    /// Bytes consumed from the current file.
    position: u64,
    /// Bytes of a line whose newline has not been written yet.
    partial: Vec<u8>,
}

impl LogFollower {
    /// Open the log. Failing here is fatal for the exporter; later failures
    /// (rotation gaps, transient read errors) are retried forever.
    pub async fn open(
        path: impl AsRef<Path>,
        config: FollowerConfig,
    ) -> Result<Self, FollowError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| FollowError::Open {
            path: path.clone(),
            source,
        };
        let mut file = File::open(&path).await.map_err(open_err)?;
        let meta = file.metadata().await.map_err(open_err)?;
        if !meta.is_file() {
            return Err(FollowError::NotAFile { path });
        }
        let position = if config.from_start {
            0
        } else {
            file.seek(SeekFrom::End(0)).await.map_err(open_err)?
        };
        debug!(path = %path.display(), position, "log file opened");
        Ok(Self {
            file_id: FileId::of(&meta),
            reader: Some(BufReader::new(file)),
            path,
            config,
            position,
            partial: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next complete line, without its `\n` / `\r\n` terminator.
    /// Invalid UTF-8 is replaced rather than dropped.
    pub async fn next_line(&mut self) -> String {
        loop {
            if self.partial.last() == Some(&b'\n') {
                return self.take_line();
            }
            if let Some(reader) = self.reader.as_mut() {
                match reader.read_until(b'\n', &mut self.partial).await {
                    Ok(0) => {}
                    Ok(n) => {
                        self.position += n as u64;
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            operation = "read_log",
                            path = %self.path.display(),
                            "log read failed; reopening"
                        );
                        self.reader = None;
                    }
                }
            }
            if !self.check_file().await {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
    }

    fn take_line(&mut self) -> String {
        let mut bytes = std::mem::take(&mut self.partial);
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    /// Called at EOF. Follows rotation and truncation, and reopens after a read
    /// error. Returns true when there is something new to read.
    async fn check_file(&mut self) -> bool {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            // Mid-rotation the path may briefly not exist.
            Err(_) => return false,
        };
        let rotated = FileId::of(&meta) != self.file_id;
        let truncated = !rotated && meta.len() < self.position;
        if self.reader.is_some() {
            if !rotated && !truncated {
                return false;
            }
            // The writer keeps appending to a renamed file until it reopens.
            if rotated && self.read_rotated_tail().await {
                return true;
            }
        }

        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, path = %self.path.display(), "log reopen failed");
                return false;
            }
        };
        let file_id = match file.metadata().await {
            Ok(m) => FileId::of(&m),
            Err(_) => FileId::of(&meta),
        };
        let rotated = file_id != self.file_id;
        if !rotated && !truncated {
            // Same file after a read error: carry on from the last consumed byte.
            if let Err(e) = file.seek(SeekFrom::Start(self.position)).await {
                debug!(error = %e, path = %self.path.display(), "log seek failed");
                return false;
            }
            debug!(path = %self.path.display(), position = self.position, "log file resumed");
        } else {
            info!(
                path = %self.path.display(),
                rotated,
                truncated,
                "log file reopened"
            );
            self.position = 0;
            self.partial.clear();
        }
        self.reader = Some(BufReader::new(file));
        self.file_id = file_id;
        true
    }

    /// Read once more from the handle of a rotated file. Returns true when it
    /// still had bytes.
    async fn read_rotated_tail(&mut self) -> bool {
        let Some(reader) = self.reader.as_mut() else {
            return false;
        };
        match reader.read_until(b'\n', &mut self.partial).await {
            Ok(n) if n > 0 => {
                self.position += n as u64;
                true
            }
            _ => false,
        }
    }

    /// Forward lines to `tx` until the receiving side is dropped.
    pub fn spawn(mut self, tx: mpsc::Sender<String>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    line = self.next_line() => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
            debug!(path = %self.path.display(), "log follower stopped");
        })
    }
}

/// Adapt the follower's channel into the stream `IngestLoop::run` consumes.
pub fn lines(rx: mpsc::Receiver<String>) -> impl Stream<Item = String> {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (line, rx))
    })
}
