/// Split `text` into consecutive pieces of at most `limit` characters.
///
/// Produces `ceil(chars / limit)` pieces whose concatenation is `text`.
/// Text within the limit comes back as a single piece.
#[must_use]
pub fn split_chunks(text: &str, limit: usize) -> Vec<&str> {
    if limit == 0 || text.chars().count() <= limit {
        return vec![text];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == limit {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);
    chunks
}
