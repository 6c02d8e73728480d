//! Splitting text that exceeds a tracker field's size limit.

/// A description that fits the field, plus overflow to post as comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChunks {
    pub description: String,
    /// Remaining text in posting order; empty when everything fits.
    pub overflow: Vec<String>,
}

impl FieldChunks {
    /// Description followed by every overflow chunk.
    pub fn reassemble(&self) -> String {
        let mut text = self.description.clone();
        for chunk in &self.overflow {
            text.push_str(chunk);
        }
        text
    }
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Lengths are counted in characters, not bytes, and no character is ever
/// split. Concatenating the chunks in order gives back `text`.
pub fn split_for_field(text: &str, max_chars: usize) -> FieldChunks {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(text[start..idx].to_string());
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() || chunks.is_empty() {
        chunks.push(text[start..].to_string());
    }

    let mut chunks = chunks.into_iter();
    FieldChunks {
        description: chunks.next().unwrap_or_default(),
        overflow: chunks.collect(),
    }
}
