//! Message body conversion from HTML to tracker wiki markup.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex_lite::Regex;
use scraper::{ElementRef, Html, Node};

use crate::attachments::{attachment_file_name, url_upload_hash};

static EXCESS_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"));

/// Elements whose boundaries become line breaks.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Elements dropped together with their content.
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "template", "title"];

/// Legacy helpdesk URL to replace in inline image sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRewrite {
    pub legacy_base: String,
    pub new_base: String,
}

impl UrlRewrite {
    pub fn new(legacy_base: impl Into<String>, new_base: impl Into<String>) -> Self {
        Self {
            legacy_base: legacy_base.into(),
            new_base: new_base.into(),
        }
    }
}

/// Result of converting one message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformedBody {
    /// Plain text with `!<filename>!` image placeholders and `[text|href]` links.
    pub text: String,
    /// Filenames referenced by placeholders.
    pub inline_attachments: BTreeSet<String>,
    /// Filename to rewritten download URL.
    pub inline_urls: BTreeMap<String, String>,
}

/// Convert one HTML message body into tracker markup.
///
/// `hash_to_name` maps attachment content hashes to the file names they
/// are staged under; placeholders use the same single-component name.
/// Without a `rewrite`, images are dropped rather than turned into
/// placeholders.
pub fn transform_body(
    body: &str,
    hash_to_name: &HashMap<String, String>,
    rewrite: Option<&UrlRewrite>,
) -> TransformedBody {
    let fragment = Html::parse_fragment(body);
    let mut walker = Walker {
        hash_to_name,
        rewrite,
        out: TransformedBody::default(),
    };
    walker.children(fragment.root_element());

    let mut result = walker.out;
    result.text = normalize_whitespace(&result.text);
    result
}

struct Walker<'a> {
    hash_to_name: &'a HashMap<String, String>,
    rewrite: Option<&'a UrlRewrite>,
    out: TransformedBody,
}

impl Walker<'_> {
    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(child_element) = ElementRef::wrap(child) {
                self.element(child_element);
            } else if let Node::Text(text) = child.value() {
                self.out.text.push_str(text);
            }
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if SKIPPED_ELEMENTS.contains(&name) {
            return;
        }
        match name {
            "br" => self.out.text.push('\n'),
            "img" => self.image(element),
            "a" => self.link(element),
            _ if BLOCK_ELEMENTS.contains(&name) => {
                self.out.text.push('\n');
                self.children(element);
                self.out.text.push('\n');
            }
            _ => self.children(element),
        }
    }

    fn image(&mut self, element: ElementRef<'_>) {
        let Some(rewrite) = self.rewrite else {
            return;
        };
        let src = element.value().attr("src").unwrap_or_default();
        if rewrite.legacy_base.is_empty() || !src.contains(&rewrite.legacy_base) {
            return;
        }

        let corrected = src.replace(&rewrite.legacy_base, &rewrite.new_base);
        let hash = url_upload_hash(&corrected);
        let name = match self.hash_to_name.get(hash) {
            Some(name) => attachment_file_name(name),
            None => attachment_file_name(hash),
        };
        let Ok(name) = name else {
            return;
        };

        self.out.text.push('!');
        self.out.text.push_str(&name);
        self.out.text.push('!');
        self.out.inline_urls.insert(name.clone(), corrected.clone());
        self.out.inline_attachments.insert(name);
    }

    fn link(&mut self, element: ElementRef<'_>) {
        let start = self.out.text.len();
        self.children(element);
        let inner = self.out.text.split_off(start);
        let label = inner.split_whitespace().collect::<Vec<_>>().join(" ");

        let href = element
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty());
        match href {
            Some(href) if label.is_empty() || label == href => {
                self.out.text.push_str(&format!("[{}]", href));
            }
            Some(href) => self.out.text.push_str(&format!("[{}|{}]", label, href)),
            None => self.out.text.push_str(&label),
        }
    }
}

/// Last path segment of a URL, without query or fragment.
fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed_lines = unified
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    EXCESS_BLANK_LINES
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}
