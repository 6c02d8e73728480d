//! Attachment resolution.
//!
//! Ticket attachments live on a remote store (a mounted directory or an
//! SFTP host) addressed by content hash; inline images are fetched over
//! HTTP from a rewritten base URL. Both are staged under `<local_root>/<ticket id>/` before upload. A failure to
//! stage one file never fails the ticket.

mod error;
mod inline;
mod naming;
mod remote;
mod resolver;
mod sftp;
mod types;

pub use error::AttachmentError;
pub use inline::InlineFetcher;
pub use naming::{assign_file_names, attachment_file_name, url_upload_hash};
pub use remote::{FsRemoteStore, RemoteFileStore};
pub use resolver::AttachmentResolver;
pub use sftp::SftpRemoteStore;
pub use types::{
    AttachmentOrigin, ResolveReport, ResolvedAttachment, SkippedAttachment, UploadOutcome,
};
