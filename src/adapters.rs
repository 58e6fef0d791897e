use crate::error::AppError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait Clipboard: Send + Sync {
    fn copy(&self, text: &str) -> Result<(), AppError>;
}

pub trait Downloader: Send + Sync {
    /// Saves `bytes` under `filename` and returns where they landed.
    fn download(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, AppError>;
}

/// System clipboard, opened on first use and kept alive afterwards so the
/// selection survives on X11.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Mutex<Option<arboard::Clipboard>>,
}

impl Clipboard for SystemClipboard {
    fn copy(&self, text: &str) -> Result<(), AppError> {
        let mut slot = self
            .inner
            .lock()
            .map_err(|_| AppError::ClipboardFailed("clipboard lock poisoned".into()))?;
        if slot.is_none() {
            let opened = arboard::Clipboard::new()
                .map_err(|e| AppError::ClipboardFailed(e.to_string()))?;
            *slot = Some(opened);
        }
        match slot.as_mut() {
            Some(clipboard) => clipboard
                .set_text(text.to_string())
                .map_err(|e| AppError::ClipboardFailed(e.to_string())),
            None => Err(AppError::ClipboardFailed("clipboard unavailable".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// Clipboard refused; the caller shows the text for manual copying.
    Manual(String),
}

pub fn copy_with_fallback(clipboard: &dyn Clipboard, text: &str) -> CopyOutcome {
    match clipboard.copy(text) {
        Ok(()) => CopyOutcome::Copied,
        Err(e) => {
            tracing::warn!(error = %e, "clipboard copy failed, falling back to manual copy");
            CopyOutcome::Manual(text.to_string())
        }
    }
}

/// Writes downloads into a directory, picking `name (n).ext` when the plain
/// name is taken.
#[derive(Debug, Clone)]
pub struct FileDownloader {
    dir: PathBuf,
}

impl FileDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn free_path(&self, filename: &str) -> PathBuf {
        let candidate = self.dir.join(filename);
        if !candidate.exists() {
            return candidate;
        }

        let path = Path::new(filename);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);
        let ext = path.extension().and_then(|s| s.to_str());
        (1..)
            .map(|n| match ext {
                Some(ext) => self.dir.join(format!("{stem} ({n}).{ext}")),
                None => self.dir.join(format!("{stem} ({n})")),
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

impl Downloader for FileDownloader {
    fn download(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.free_path(filename);
        fs::write(&target, bytes)?;
        tracing::info!(path = %target.display(), bytes = bytes.len(), "download saved");
        Ok(target)
    }
}
