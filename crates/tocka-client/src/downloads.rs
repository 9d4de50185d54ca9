use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::Result;

const FALLBACK_FILE_NAME: &str = "download";

/// Received files, written under one directory without ever replacing an
/// existing file.
#[derive(Debug, Clone)]
pub struct DownloadStore {
    dir: PathBuf,
}

impl DownloadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `data` as `file_name`. When that name is taken the first free
    /// `stem_N.ext` (N = 1, 2, ...) is used instead. Returns the final path.
    pub async fn save(&self, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let name = sanitize(file_name);
        let mut attempt = 0u32;
        loop {
            let path = self.dir.join(candidate_name(&name, attempt));
            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(data).await?;
                    file.flush().await?;
                    info!(path = %path.display(), size = data.len(), "File saved");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Name taken, trying next");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Keep only the final path component of a sender-supplied name.
fn sanitize(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}

/// `report.pdf` -> `report_1.pdf`. A name without an extension, or whose
/// only dot is the leading one (`.bashrc`), gets the suffix at the end.
fn candidate_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}{}", &name[..dot], attempt, &name[dot..]),
        _ => format!("{name}_{attempt}"),
    }
}
