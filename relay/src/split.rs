//! Chunking of long text for destinations with a message size limit.

/// Continuation marker placed at every interior chunk boundary.
const ELLIPSIS: &str = "...";

/// How far back from the nominal boundary to look for a space or newline.
const MAX_BACKTRACK: usize = 250;

/// Kind of boundary between two chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Break {
    /// Split on a space, or forced mid-word
    Inline,
    /// Split on a newline; markers go on their own line
    Line,
}

impl Break {
    fn leading(self) -> String {
        match self {
            Break::Inline => ELLIPSIS.to_string(),
            Break::Line => format!("{ELLIPSIS}\n"),
        }
    }

    fn trailing(self) -> String {
        match self {
            Break::Inline => ELLIPSIS.to_string(),
            Break::Line => format!("\n{ELLIPSIS}"),
        }
    }
}

/// Split `text` into chunks of roughly `max_chunk_size` characters.
///
/// Text shorter than `max_chunk_size`, or a size of `0`, comes back as a
/// single unchanged chunk. Otherwise each chunk ends at the last space or
/// newline within 250 characters of the nominal boundary (or exactly at the
/// boundary if there is none), is trimmed, and gets `...` markers on its
/// interior sides. Sizes count characters, not bytes.
///
/// Numbering chunks as `(i/n)` is left to the caller.
pub fn split(max_chunk_size: usize, text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();

    if max_chunk_size == 0 || chars.len() < max_chunk_size {
        return vec![text.to_string()];
    }

    // Trimmed chunk text paired with the break that follows it.
    let mut pieces: Vec<(String, Break)> = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let nominal = start + max_chunk_size;
        let (end, kind) = if nominal >= chars.len() {
            (chars.len(), Break::Inline)
        } else {
            find_break(&chars, start, nominal)
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push((piece.to_string(), kind));
        }

        start = end;
    }

    if pieces.is_empty() {
        return vec![text.trim().to_string()];
    }

    let last = pieces.len() - 1;
    let mut chunks = Vec::with_capacity(pieces.len());
    let mut leading: Option<Break> = None;

    for (index, (piece, kind)) in pieces.into_iter().enumerate() {
        let mut chunk = String::with_capacity(piece.len() + 2 * (ELLIPSIS.len() + 1));
        if let Some(previous) = leading {
            chunk.push_str(&previous.leading());
        }
        chunk.push_str(&piece);
        if index < last {
            chunk.push_str(&kind.trailing());
        }
        chunks.push(chunk);
        leading = Some(kind);
    }

    chunks
}

/// Find where the chunk starting at `start` should end.
///
/// The returned index is the break character itself, which begins the next
/// chunk and is removed by trimming.
fn find_break(chars: &[char], start: usize, nominal: usize) -> (usize, Break) {
    let floor = nominal.saturating_sub(MAX_BACKTRACK).max(start + 1);

    (floor..=nominal)
        .rev()
        .find_map(|index| match chars[index] {
            '\n' => Some((index, Break::Line)),
            ' ' => Some((index, Break::Inline)),
            _ => None,
        })
        .unwrap_or((nominal, Break::Inline))
}
