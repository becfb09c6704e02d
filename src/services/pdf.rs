//! Book text extraction from PDF files.
//!
//! `pdf_extract` can panic on malformed input instead of returning an error,
//! so extraction runs inside [`std::panic::catch_unwind`] and both outcomes
//! surface as [`DocumentOpenError`].

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;

use crate::core::io::write_text;

#[derive(Debug, Error)]
pub enum DocumentOpenError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path} as PDF: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Decodes the document at `path` into one string per page.
pub fn extract_pages(path: &Path) -> Result<Vec<String>, DocumentOpenError> {
    let bytes = std::fs::read(path).map_err(|source| DocumentOpenError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(DocumentOpenError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        Err(_) => Err(DocumentOpenError::Parse {
            path: path.to_path_buf(),
            message: "PDF library panicked (malformed document)".to_string(),
        }),
    }
}

/// Concatenates page texts in order, each followed by a newline. Pages with no
/// text are dropped without a placeholder.
pub fn join_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for (i, page) in pages.into_iter().enumerate() {
        let page = page.as_ref();
        println!("processing page : {}", i + 1);
        if page.trim().is_empty() {
            log::debug!("page {} has no extractable text", i + 1);
            continue;
        }
        text.push_str(page);
        text.push('\n');
    }
    text
}

/// Reads the whole PDF into book text.
pub fn extract_book_text(pdf_path: &Path) -> Result<String, DocumentOpenError> {
    let pages = extract_pages(pdf_path)?;
    log::info!("{} has {} pages", pdf_path.display(), pages.len());
    Ok(join_pages(pages))
}

/// Extracts `pdf_path` and writes the text to `book_path`. Nothing is written
/// when the document cannot be opened.
pub fn extract_to_file(pdf_path: &Path, book_path: &Path) -> Result<usize> {
    let text = extract_book_text(pdf_path)?;
    write_text(book_path, &text)?;
    println!("Wrote {} characters to {}", text.chars().count(), book_path.display());
    Ok(text.len())
}
