use std::{
    fs::OpenOptions,
    io::SeekFrom,
    path::{Path, PathBuf},
};

use tempfile::TempPath;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tracing::debug;

use crate::error::NgrokResult;

/// Log file that receives the agent's output and is re-read while polling
#[derive(Debug)]
pub struct AgentLog {
    path: PathBuf,
    reader: File,
    /// Removes the file on drop when it is a temporary one
    _temp: Option<TempPath>,
}

impl AgentLog {
    /// Open (and truncate) `path`, or create a temporary file when `None`
    pub fn open(path: Option<&Path>) -> NgrokResult<Self> {
        match path {
            Some(path) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?;
                debug!("Opened agent log at {}", path.display());

                Ok(Self {
                    path: path.to_path_buf(),
                    reader: File::from_std(file),
                    _temp: None,
                })
            }
            None => {
                let (file, temp) = tempfile::Builder::new()
                    .prefix("ngrok")
                    .suffix(".log")
                    .tempfile()?
                    .into_parts();
                debug!("Opened temporary agent log at {}", temp.display());

                Ok(Self {
                    path: temp.to_path_buf(),
                    reader: File::from_std(file),
                    _temp: Some(temp),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append-mode handle for the agent's stdout and stderr. It has its own
    /// file offset, so rewinding the reader never moves the agent's writes.
    pub fn writer(&self) -> NgrokResult<std::fs::File> {
        Ok(OpenOptions::new().append(true).open(&self.path)?)
    }

    /// Everything written so far, read from the start
    pub async fn read_all(&mut self) -> NgrokResult<String> {
        self.reader.seek(SeekFrom::Start(0)).await?;
        let mut buf = Vec::new();
        self.reader.read_to_end(&mut buf).await?;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
