//! Sliding-window chunking with separator-aware boundaries.
//!
//! The splitter walks a fixed grid: chunk `i` starts `chunk_size - overlap` characters
//! after chunk `i-1`, so adjacent chunks share an overlap region and sentences
//! straddling a boundary appear intact in at least one chunk. Each window nominally
//! ends `chunk_size` characters after its start; the end is then extended to the
//! nearest boundary within a small tolerance, preferring the strongest separator
//! available (paragraph break, then line break, sentence boundary, space). Output is
//! a pure function of the input text and parameters.
//!
//! Coverage guarantee: with window `chunk_size` and stride `chunk_size - overlap`,
//! any span of up to `overlap + 1` characters lands wholly inside some chunk. A
//! stronger guarantee of `chunk_size - overlap` intact characters holds exactly when
//! `overlap + 1 >= chunk_size - overlap`; smaller overlaps trade that away for fewer,
//! larger windows. See DESIGN.md for the full analysis.

use super::types::{Chunk, ChunkParams, ChunkingError};

/// Separators in preference order; the empty string stands for a bare character cut.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Extra characters a chunk may run past `chunk_size` to land on a separator.
fn boundary_tolerance(chunk_size: usize) -> usize {
    (chunk_size / 10).max(1)
}

/// Split `text` into overlapping chunks for the given document.
///
/// Returns an empty vector when the text is all whitespace. Chunk character length
/// never exceeds `chunk_size + tolerance`, and consecutive chunk starts are exactly
/// `chunk_size - overlap` characters apart.
pub fn chunk_text(
    text: &str,
    params: ChunkParams,
    document_id: &str,
) -> Result<Vec<Chunk>, ChunkingError> {
    let ChunkParams {
        chunk_size,
        overlap,
    } = params;
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(ChunkingError::InvalidParams);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, with the text length as a sentinel.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let stride = chunk_size - overlap;
    let tolerance = boundary_tolerance(chunk_size);
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total_chars {
        let nominal_end = (start + chunk_size).min(total_chars);
        let end_byte = if nominal_end == total_chars {
            text.len()
        } else {
            let window_end = (nominal_end + tolerance).min(total_chars);
            separator_end(text, boundaries[nominal_end], boundaries[window_end])
        };

        let piece = &text[boundaries[start]..end_byte];
        if !piece.trim().is_empty() {
            chunks.push(Chunk::new(
                document_id,
                chunks.len(),
                piece.to_string(),
                start,
            ));
        }

        if nominal_end == total_chars {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

/// Pick the chunk end inside `[from, to]`: the first occurrence of the strongest
/// separator, or `from` when the window contains none.
fn separator_end(text: &str, from: usize, to: usize) -> usize {
    let window = &text[from..to];
    for separator in SEPARATORS {
        if let Some(position) = window.find(separator) {
            return from + position + separator.len();
        }
    }
    from
}
