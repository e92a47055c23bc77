// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Page-level PDF text extraction
//!
//! Pulls text page by page with `lopdf`, splits each page into paragraph
//! blocks, and drops blocks shorter than `min_block_chars` (headers, footers,
//! page numbers). Image-only pages yield zero blocks instead of failing the
//! document; a corrupt document is an [`RagError::Extraction`] the caller
//! recovers from by skipping it.

use crate::errors::RagError;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One extracted text block with its 1-indexed page number
#[derive(Debug, Clone, PartialEq)]
pub struct PageBlock {
    pub text: String,
    pub page: u32,
}

/// List the PDF files in a corpus directory, sorted for deterministic
/// processing order. Extension match is case-insensitive.
pub fn collect_pdfs(dir: &Path) -> Result<Vec<PathBuf>, RagError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if path.is_file() && is_pdf {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Extract all text blocks of a document in reading order
pub fn extract_document(path: &Path, min_block_chars: usize) -> Result<Vec<PageBlock>, RagError> {
    let document_name = path.display().to_string();
    let doc = Document::load(path).map_err(|e| RagError::Extraction {
        document: document_name.clone(),
        reason: e.to_string(),
    })?;

    let mut blocks = Vec::new();
    for (&page_number, _) in doc.get_pages().iter() {
        // An unreadable page (scanned image, broken content stream) yields
        // zero blocks for that page rather than failing the document
        let page_text = match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                debug!(
                    document = %document_name,
                    page = page_number,
                    "no extractable text: {}", e
                );
                continue;
            }
        };
        for text in split_paragraphs(&page_text, min_block_chars) {
            blocks.push(PageBlock {
                text,
                page: page_number,
            });
        }
    }
    Ok(blocks)
}

/// Split raw page text into paragraph candidates, dropping layout noise
fn split_paragraphs(page_text: &str, min_block_chars: usize) -> Vec<String> {
    page_text
        .split("\n\n")
        .map(|paragraph| {
            // Rejoin hard line breaks inside a paragraph
            paragraph
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| text.chars().count() > min_block_chars)
        .collect()
}
