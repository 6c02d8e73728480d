//! Staging of a ticket's attachments on local disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::source::AttachmentMeta;

use super::inline::InlineFetcher;
use super::naming::{assign_file_names, attachment_file_name, url_upload_hash};
use super::remote::RemoteFileStore;
use super::types::{AttachmentOrigin, ResolveReport, ResolvedAttachment, SkippedAttachment};
use super::AttachmentError;

/// Collects remote-store and inline-image attachments into a per-ticket
/// staging directory under `local_root`.
#[derive(Clone)]
pub struct AttachmentResolver {
    local_root: PathBuf,
    remote: Option<Arc<dyn RemoteFileStore>>,
    inline: Option<InlineFetcher>,
}

impl AttachmentResolver {
    /// Resolver that stages nothing until sources are added.
    pub fn new(local_root: impl Into<PathBuf>) -> Self {
        Self {
            local_root: local_root.into(),
            remote: None,
            inline: None,
        }
    }

    pub fn with_remote_store(mut self, store: Arc<dyn RemoteFileStore>) -> Self {
        self.remote = Some(store);
        self
    }

    pub fn with_inline_fetcher(mut self, fetcher: InlineFetcher) -> Self {
        self.inline = Some(fetcher);
        self
    }

    /// Staging directory for one ticket, keyed by internal id.
    pub fn staging_dir(&self, ticket_id: i64) -> PathBuf {
        self.local_root.join(ticket_id.to_string())
    }

    /// Stage every attachment of a ticket.
    ///
    /// Inline images are fetched first, then remote-store files. Remote
    /// names come from [`assign_file_names`], so two uploads sharing a name
    /// are staged as `image.png` and `image (2).png`. A remote file already
    /// staged as an inline image with the same hash is not fetched twice.
    /// A file that cannot be fetched is reported in
    /// [`ResolveReport::skipped`]; only a failure to create the staging
    /// directory is returned as an error.
    pub async fn resolve(
        &self,
        ticket_id: i64,
        remote: &[AttachmentMeta],
        inline: &BTreeMap<String, String>,
    ) -> Result<ResolveReport, AttachmentError> {
        let mut report = ResolveReport::default();
        let inline_work = self.inline.as_ref().filter(|_| !inline.is_empty());
        let remote_work = self.remote.as_ref().filter(|_| !remote.is_empty());
        if inline_work.is_none() && remote_work.is_none() {
            return Ok(report);
        }

        let staging = self.staging_dir(ticket_id);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| AttachmentError::StagingFailed {
                path: staging.clone(),
                source: e,
            })?;

        // staged file name -> upload hash it was fetched for
        let mut staged_names: HashMap<String, String> = HashMap::new();

        if let Some(fetcher) = inline_work {
            for (name, url) in inline {
                let result = match attachment_file_name(name) {
                    Ok(file_name) => {
                        let path = staging.join(&file_name);
                        fetcher
                            .fetch(url, &path)
                            .await
                            .map(|_| ResolvedAttachment::new(path, AttachmentOrigin::InlineHttp, file_name))
                    }
                    Err(e) => Err(e),
                };
                match result {
                    Ok(attachment) => {
                        info!(ticket_id, file = %attachment.file_name, "Downloaded inline image");
                        staged_names
                            .insert(attachment.file_name.clone(), url_upload_hash(url).to_string());
                        report.staged.push(attachment);
                    }
                    Err(e) => {
                        warn!(ticket_id, file = %name, url = %url, error = %e, "Could not download inline image");
                        report.skipped.push(SkippedAttachment {
                            file_name: name.clone(),
                            origin: AttachmentOrigin::InlineHttp,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        if let Some(store) = remote_work {
            let names = assign_file_names(remote);
            let mut seen_hashes = HashSet::new();
            for meta in remote {
                if !seen_hashes.insert(meta.upload_hash.as_str()) {
                    debug!(ticket_id, hash = %meta.upload_hash, "Duplicate attachment row");
                    continue;
                }
                let Some(file_name) = names.get(&meta.upload_hash).cloned() else {
                    let e = AttachmentError::InvalidName(meta.original_name.clone());
                    warn!(ticket_id, file = %meta.original_name, error = %e, "Skipping attachment");
                    report.skipped.push(SkippedAttachment {
                        file_name: meta.original_name.clone(),
                        origin: AttachmentOrigin::RemoteStore,
                        reason: e.to_string(),
                    });
                    continue;
                };
                match staged_names.get(&file_name) {
                    Some(hash) if *hash == meta.upload_hash => {
                        debug!(ticket_id, file = %file_name, "Attachment already staged as inline image");
                        continue;
                    }
                    Some(hash) => {
                        warn!(
                            ticket_id,
                            file = %file_name,
                            inline_hash = %hash,
                            upload_hash = %meta.upload_hash,
                            "Attachment name taken by a different inline image"
                        );
                        report.skipped.push(SkippedAttachment {
                            file_name,
                            origin: AttachmentOrigin::RemoteStore,
                            reason: "name already used by a different inline image".to_string(),
                        });
                        continue;
                    }
                    None => {}
                }

                let path = staging.join(&file_name);
                match store.fetch(&meta.upload_hash, &path).await {
                    Ok(bytes) => {
                        info!(ticket_id, file = %file_name, bytes, "Downloaded attachment");
                        staged_names.insert(file_name.clone(), meta.upload_hash.clone());
                        report.staged.push(ResolvedAttachment::new(
                            path,
                            AttachmentOrigin::RemoteStore,
                            file_name,
                        ));
                    }
                    Err(e) => {
                        if e.is_not_found() {
                            warn!(
                                ticket_id,
                                file = %file_name,
                                remote = %store.remote_path(&meta.upload_hash).display(),
                                "Missing attachment on remote store"
                            );
                        } else {
                            warn!(ticket_id, file = %file_name, error = %e, "Error downloading attachment");
                        }
                        report.skipped.push(SkippedAttachment {
                            file_name,
                            origin: AttachmentOrigin::RemoteStore,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(report)
    }
}
