//! Conversation rendering: message bodies to tracker markup, the composed
//! issue description, and splitting it to fit the description field.

mod chunking;
mod description;
mod transformer;

pub use chunking::{split_for_field, FieldChunks};
pub use description::{
    compose_description, issue_summary, placeholder_description, ComposedDescription,
    ENTRY_SEPARATOR,
};
pub use transformer::{transform_body, TransformedBody, UrlRewrite};
