// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// PDF text extraction
// Produces page-attributed text blocks in reading order for the segmenter

pub mod pdf;

pub use pdf::{collect_pdfs, extract_document, PageBlock};
