//! File names used for a ticket's attachments, both on disk and in
//! `!name!` description placeholders.

use std::collections::{HashMap, HashSet};

use crate::source::AttachmentMeta;

use super::AttachmentError;

/// Reduce an attachment name to a single path component.
pub fn attachment_file_name(name: &str) -> Result<String, AttachmentError> {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        return Err(AttachmentError::InvalidName(name.to_string()));
    }
    Ok(last.to_string())
}

/// Assign each upload hash one file name, unique within the ticket.
///
/// Rows sharing a hash share the first row's name. A different hash whose
/// name is already taken gets a numbered variant, `image (2).png`. Hashes
/// with no usable name are left out.
pub fn assign_file_names(attachments: &[AttachmentMeta]) -> HashMap<String, String> {
    let mut names = HashMap::with_capacity(attachments.len());
    let mut taken = HashSet::new();

    for meta in attachments {
        if names.contains_key(&meta.upload_hash) {
            continue;
        }
        let Ok(base) = attachment_file_name(&meta.original_name) else {
            continue;
        };
        let mut name = base.clone();
        let mut n = 2;
        while taken.contains(&name) {
            name = numbered(&base, n);
            n += 1;
        }
        taken.insert(name.clone());
        names.insert(meta.upload_hash.clone(), name);
    }
    names
}

/// Upload hash addressed by an inline image URL: its last path segment.
pub fn url_upload_hash(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/').next().unwrap_or_default()
}

fn numbered(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(hash: &str, name: &str) -> AttachmentMeta {
        AttachmentMeta {
            ticket_id: 1,
            upload_hash: hash.to_string(),
            original_name: name.to_string(),
        }
    }

    #[test]
    fn test_attachment_file_name() {
        assert_eq!(attachment_file_name("report.pdf").unwrap(), "report.pdf");
        assert_eq!(attachment_file_name("shots/screen.png").unwrap(), "screen.png");
        assert_eq!(attachment_file_name("C:\\tmp\\a.txt").unwrap(), "a.txt");
        assert!(attachment_file_name("dir/").is_err());
        assert!(attachment_file_name("..").is_err());
        assert!(attachment_file_name("").is_err());
    }

    #[test]
    fn test_colliding_names_get_numbered() {
        let names = assign_file_names(&[
            meta("h1", "image.png"),
            meta("h2", "image.png"),
            meta("h3", "uploads/image.png"),
            meta("h4", "README"),
            meta("h5", "README"),
            meta("h6", ".env"),
            meta("h7", ".env"),
        ]);

        assert_eq!(names["h1"], "image.png");
        assert_eq!(names["h2"], "image (2).png");
        assert_eq!(names["h3"], "image (3).png");
        assert_eq!(names["h4"], "README");
        assert_eq!(names["h5"], "README (2)");
        assert_eq!(names["h6"], ".env");
        assert_eq!(names["h7"], ".env (2)");
    }

    #[test]
    fn test_same_hash_keeps_one_name() {
        let names = assign_file_names(&[
            meta("h1", "log.txt"),
            meta("h1", "other.txt"),
            meta("h2", "log.txt"),
            meta("h3", ".."),
        ]);

        assert_eq!(names.len(), 2);
        assert_eq!(names["h1"], "log.txt");
        assert_eq!(names["h2"], "log (2).txt");
        assert!(!names.contains_key("h3"));
    }

    #[test]
    fn test_url_upload_hash() {
        assert_eq!(url_upload_hash("https://new.example/files/abc123"), "abc123");
        assert_eq!(
            url_upload_hash("https://new.example/files/ffee99?size=large#top"),
            "ffee99"
        );
        assert_eq!(url_upload_hash("https://new.example/files/"), "");
    }
}
