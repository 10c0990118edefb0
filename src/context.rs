use std::fs;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to load {kind} from {}: {source}", path.display())]
    ResourceLoad {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to extract text from {}: {message}", path.display())]
    PdfText { path: PathBuf, message: String },
}

/// The person the chatbot speaks for, loaded once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    name: String,
    biography: String,
    resume_text: String,
}

impl IdentityContext {
    pub fn new(
        name: impl Into<String>,
        biography: impl Into<String>,
        resume_text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            biography: biography.into(),
            resume_text: resume_text.into(),
        }
    }

    /// Reads both documents from disk. A `.pdf` résumé is reduced to its
    /// text; anything else must be UTF-8.
    pub fn load(
        name: &str,
        biography_path: &Path,
        resume_path: &Path,
    ) -> Result<Self, ContextError> {
        let biography = read_document("biography", biography_path)?;
        let resume_text = if is_pdf(resume_path) {
            read_pdf("resume", resume_path)?
        } else {
            read_document("resume", resume_path)?
        };
        Ok(Self::new(name, biography, resume_text))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn biography(&self) -> &str {
        &self.biography
    }

    pub fn resume_text(&self) -> &str {
        &self.resume_text
    }
}

fn read_document(kind: &'static str, path: &Path) -> Result<String, ContextError> {
    fs::read_to_string(path).map_err(|source| ContextError::ResourceLoad {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn read_pdf(kind: &'static str, path: &Path) -> Result<String, ContextError> {
    let bytes = fs::read(path).map_err(|source| ContextError::ResourceLoad {
        kind,
        path: path.to_path_buf(),
        source,
    })?;
    let text = extract_pdf_text(&bytes).map_err(|message| ContextError::PdfText {
        path: path.to_path_buf(),
        message,
    })?;
    if text.trim().is_empty() {
        tracing::warn!(path = %path.display(), "{kind} PDF contains no extractable text");
    }
    Ok(text)
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    // pdf-extract panics on some malformed files rather than returning Err.
    match panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err("malformed PDF".to_string()),
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
