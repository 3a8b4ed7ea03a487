//! Live job/item stores over pluggable document- and object-store backends.
//!
//! The backing document store pushes whole-snapshot updates through a
//! `watch` channel: every collaborator sharing the store sees adds and
//! deletes without polling, and snapshots are applied whole (last write
//! observed wins), never merged field by field.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{ItemFields, Job, PhotoBlob, PhotoRef, PunchlistItem};
use crate::{Error, Result};

pub use memory::{MemoryDocumentStore, MemoryObjectStore};

/// Persistent store of job documents, each embedding its item sequence.
///
/// Implementations must deliver owner-filtered snapshots ordered
/// newest-created first, republish on every change, and apply
/// `update_items` as one atomic whole-field write.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Subscribe to the live job list of one owner.
    async fn subscribe(&self, user_id: &str) -> anyhow::Result<watch::Receiver<Vec<Job>>>;

    /// Create a job document.
    async fn insert_job(&self, job: &Job) -> anyhow::Result<()>;

    /// Fetch one job document, `None` if it does not exist.
    async fn fetch_job(&self, job_id: Uuid) -> anyhow::Result<Option<Job>>;

    /// Replace a job's embedded item sequence in one atomic update.
    async fn update_items(&self, job_id: Uuid, items: &[PunchlistItem]) -> anyhow::Result<()>;

    /// Delete a job document. Deleting an absent document is not an error.
    async fn delete_job(&self, job_id: Uuid) -> anyhow::Result<()>;
}

/// Content store for photo blobs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a blob under `path` and return its durable URL.
    async fn put(&self, blob: &PhotoBlob, path: &str) -> anyhow::Result<String>;

    /// Delete the object behind a previously returned URL.
    async fn delete(&self, url: &str) -> anyhow::Result<()>;
}

/// The authoritative job and item collections of one backing store.
///
/// Item updates are read-modify-write against the last fetched document;
/// a delete racing a concurrent add to the same job's item sequence may
/// lose the add. The backing store's atomic document update is the only
/// guarantee offered.
pub struct JobStore {
    documents: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
}

impl JobStore {
    pub fn new(documents: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { documents, objects }
    }

    /// Live job list for one owner, newest-created first. The receiver
    /// tracks every subsequent add/delete without explicit polling.
    pub async fn jobs(&self, user_id: &str) -> Result<watch::Receiver<Vec<Job>>> {
        self.documents
            .subscribe(user_id)
            .await
            .map_err(|e| Error::persistence(e.to_string()))
    }

    /// Create a job with an empty item sequence.
    pub async fn add_job(&self, name: &str, user_id: &str) -> Result<Job> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation { missing: vec!["name"] });
        }

        let job = Job::new(name, user_id);
        self.documents
            .insert_job(&job)
            .await
            .map_err(|e| Error::persistence(e.to_string()))?;

        debug!("created job {} for user {}", job.id, user_id);
        Ok(job)
    }

    /// Delete a job and, best effort, all of its stored photos.
    ///
    /// Individual photo-deletion failures are logged and never block the
    /// job deletion itself.
    pub async fn remove_job(&self, job_id: Uuid) -> Result<()> {
        let job = self.fetch_existing(job_id).await?;

        for item in &job.items {
            self.delete_photo_best_effort(&item.photo, item.id).await;
        }

        self.documents
            .delete_job(job_id)
            .await
            .map_err(|e| Error::persistence(e.to_string()))
    }

    /// Upload the photo and prepend a new item to the job's sequence.
    ///
    /// The sequence is persisted as one atomic update. When that update
    /// fails after the upload already succeeded, the error carries the
    /// uploaded URL so the caller can reconcile the orphaned blob.
    pub async fn add_item(
        &self,
        job_id: Uuid,
        fields: ItemFields,
        photo: PhotoBlob,
    ) -> Result<PunchlistItem> {
        let job = self.fetch_existing(job_id).await?;

        let path = upload_path(&job.user_id, job_id, &photo.file_name);
        let url = self
            .objects
            .put(&photo, &path)
            .await
            .map_err(|e| Error::persistence(format!("photo upload failed: {}", e)))?;

        let item = PunchlistItem::new(fields, PhotoRef::Remote(url.clone()));

        let mut items = Vec::with_capacity(job.items.len() + 1);
        items.push(item.clone());
        items.extend(job.items);

        self.documents
            .update_items(job_id, &items)
            .await
            .map_err(|e| Error::Persistence {
                message: e.to_string(),
                orphaned_photo: Some(url),
            })?;

        Ok(item)
    }

    /// Remove one item, best-effort deleting its stored photo first.
    pub async fn remove_item(&self, job_id: Uuid, item_id: Uuid) -> Result<()> {
        let job = self.fetch_existing(job_id).await?;

        let item = job
            .items
            .iter()
            .find(|item| item.id == item_id)
            .ok_or(Error::NotFound {
                entity: "item",
                id: item_id.to_string(),
            })?;

        self.delete_photo_best_effort(&item.photo, item.id).await;

        let remaining: Vec<PunchlistItem> = job
            .items
            .iter()
            .filter(|item| item.id != item_id)
            .cloned()
            .collect();

        self.documents
            .update_items(job_id, &remaining)
            .await
            .map_err(|e| Error::persistence(e.to_string()))
    }

    async fn fetch_existing(&self, job_id: Uuid) -> Result<Job> {
        self.documents
            .fetch_job(job_id)
            .await
            .map_err(|e| Error::persistence(e.to_string()))?
            .ok_or(Error::NotFound {
                entity: "job",
                id: job_id.to_string(),
            })
    }

    async fn delete_photo_best_effort(&self, photo: &PhotoRef, item_id: Uuid) {
        if let Some(url) = photo.url() {
            if let Err(e) = self.objects.delete(url).await {
                let cleanup = Error::StorageCleanup(format!("item {}: {}", item_id, e));
                warn!("{}", cleanup);
            }
        }
    }
}

/// Collision-resistant object path, namespaced by owner and job.
fn upload_path(user_id: &str, job_id: Uuid, file_name: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!(
        "images/{}/{}/{}-{}-{}",
        user_id, job_id, timestamp, suffix, file_name
    )
}
