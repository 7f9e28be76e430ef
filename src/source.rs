/// Line sources: a whole file, standard input, or a file being appended to.
///
/// Bytes are decoded lossily so binary junk in a log never stops a run; such
/// lines simply fail to parse later.
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncSeekExt, BufReader};

/// Where log lines come from, as named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    Stdin,
    File(PathBuf),
}

impl InputSpec {
    /// `-` means standard input, anything else is a file path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            InputSpec::Stdin
        } else {
            InputSpec::File(PathBuf::from(arg))
        }
    }
}

impl std::fmt::Display for InputSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSpec::Stdin => write!(f, "<stdin>"),
            InputSpec::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Errors from opening or reading a line source.
#[derive(Debug)]
pub enum SourceError {
    /// The log file does not exist or cannot be opened.
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Reading from an already opened source failed.
    Read { source: std::io::Error },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Open { path, source } => match source.kind() {
                std::io::ErrorKind::NotFound => {
                    write!(f, "log file not found: {}", path.display())
                }
                std::io::ErrorKind::PermissionDenied => {
                    write!(f, "permission denied: {}", path.display())
                }
                _ => write!(f, "cannot open log file {}: {}", path.display(), source),
            },
            SourceError::Read { source } => write!(f, "failed to read log input: {}", source),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Open { source, .. } => Some(source),
            SourceError::Read { source } => Some(source),
        }
    }
}

async fn open_file(path: &Path) -> Result<File, SourceError> {
    let open_err = |source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).await.map_err(open_err)?;
    let meta = file.metadata().await.map_err(open_err)?;
    if meta.is_dir() {
        return Err(open_err(std::io::Error::other("is a directory")));
    }
    Ok(file)
}

/// Strip the line terminator and decode.
fn decode_line(mut raw: Vec<u8>) -> String {
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }
    match String::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Finite line source read to exhaustion (batch mode).
pub struct LineSource {
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    lines_read: u64,
}

impl LineSource {
    /// Open a named file or standard input.
    pub async fn open(spec: &InputSpec) -> Result<Self, SourceError> {
        match spec {
            InputSpec::Stdin => Ok(Self::from_reader(BufReader::new(tokio::io::stdin()))),
            InputSpec::File(path) => {
                let file = open_file(path).await?;
                tracing::debug!(path = %path.display(), "opened log file");
                Ok(Self::from_reader(BufReader::new(file)))
            }
        }
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            lines_read: 0,
        }
    }

    /// Next line, or `None` at end of input. A final line without a
    /// trailing newline is still returned.
    pub async fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut raw = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut raw)
            .await
            .map_err(|source| SourceError::Read { source })?;
        if n == 0 {
            return Ok(None);
        }
        self.lines_read += 1;
        Ok(Some(decode_line(raw)))
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

/// What a follow reader produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// A complete, newline-terminated line.
    Line(String),
    /// The reader hit end of file for the first time. Emitted once.
    CaughtUp,
}

/// Tails a growing file, like `tail -f`. Rotation is not handled.
pub struct FollowReader {
    reader: BufReader<File>,
    path: PathBuf,
    poll_interval: Duration,
    partial: Vec<u8>,
    caught_up: bool,
}

impl FollowReader {
    /// Open `path` for following. With `replay_existing` false, reading
    /// starts at the current end of file.
    pub async fn open(
        path: &Path,
        poll_interval: Duration,
        replay_existing: bool,
    ) -> Result<Self, SourceError> {
        let mut file = open_file(path).await?;
        if !replay_existing {
            let pos = file
                .seek(std::io::SeekFrom::End(0))
                .await
                .map_err(|source| SourceError::Read { source })?;
            tracing::debug!(path = %path.display(), offset = pos, "skipping existing content");
        }
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            poll_interval,
            partial: Vec::new(),
            caught_up: false,
        })
    }

    /// Read the next complete line, sleeping and retrying while the file has
    /// no new data. Never returns end of input; cancel by dropping the future.
    pub async fn next_event(&mut self) -> Result<TailEvent, SourceError> {
        loop {
            self.reader
                .read_until(b'\n', &mut self.partial)
                .await
                .map_err(|source| SourceError::Read { source })?;

            if self.partial.last() == Some(&b'\n') {
                let raw = std::mem::take(&mut self.partial);
                return Ok(TailEvent::Line(decode_line(raw)));
            }

            // End of file, possibly with half a line buffered.
            if !self.caught_up {
                self.caught_up = true;
                tracing::debug!(path = %self.path.display(), "caught up with end of file");
                return Ok(TailEvent::CaughtUp);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
