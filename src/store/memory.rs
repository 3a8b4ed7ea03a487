//! In-process store backends.
//!
//! These power the crate's tests and local development against the same
//! trait surface a cloud deployment implements. The object store can be
//! told to fail specific deletes so cleanup paths can be exercised.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use anyhow::{anyhow, bail, Result};
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use super::{DocumentStore, ObjectStore};
use crate::model::{Job, PhotoBlob, PunchlistItem};

#[derive(Default)]
struct DocumentState {
    jobs: HashMap<Uuid, Job>,
    watchers: HashMap<String, watch::Sender<Vec<Job>>>,
}

impl DocumentState {
    fn snapshot_for(&self, user_id: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|job| job.user_id == user_id)
            .cloned()
            .collect();
        // Newest-created first; id as a tiebreaker keeps the order stable.
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    fn publish(&self, user_id: &str) {
        if let Some(sender) = self.watchers.get(user_id) {
            sender.send_replace(self.snapshot_for(user_id));
        }
    }
}

/// In-memory document store with live, owner-filtered snapshots.
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: RwLock<DocumentState>,
    fail_updates: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `update_items` fail, for partial-failure tests.
    pub async fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn subscribe(&self, user_id: &str) -> Result<watch::Receiver<Vec<Job>>> {
        let mut state = self.state.write().await;
        let snapshot = state.snapshot_for(user_id);
        let sender = state
            .watchers
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(snapshot).0);
        Ok(sender.subscribe())
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        let mut state = self.state.write().await;
        state.jobs.insert(job.id, job.clone());
        state.publish(&job.user_id);
        Ok(())
    }

    async fn fetch_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.state.read().await.jobs.get(&job_id).cloned())
    }

    async fn update_items(&self, job_id: Uuid, items: &[PunchlistItem]) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            bail!("simulated document update failure");
        }

        let mut state = self.state.write().await;
        let user_id = {
            let job = state
                .jobs
                .get_mut(&job_id)
                .ok_or_else(|| anyhow!("job {} not found", job_id))?;
            job.items = items.to_vec();
            job.user_id.clone()
        };
        state.publish(&user_id);
        Ok(())
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(job) = state.jobs.remove(&job_id) {
            state.publish(&job.user_id);
        }
        Ok(())
    }
}

/// In-memory object store addressing blobs as `memory://{path}` URLs.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    poisoned: RwLock<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.objects.read().await.contains_key(url)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Make `delete` of the given URL fail, for cleanup-path tests.
    pub async fn fail_delete_of(&self, url: &str) {
        self.poisoned.write().await.insert(url.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, blob: &PhotoBlob, path: &str) -> Result<String> {
        let url = format!("memory://{}", path);
        self.objects
            .write()
            .await
            .insert(url.clone(), blob.data.clone());
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<()> {
        if self.poisoned.read().await.contains(url) {
            bail!("simulated storage failure for {}", url);
        }
        self.objects
            .write()
            .await
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| anyhow!("object {} not found", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemFields, PhotoRef};

    #[tokio::test]
    async fn test_snapshot_replaces_whole_list_on_change() {
        let store = MemoryDocumentStore::new();
        let mut jobs = store.subscribe("user-1").await.unwrap();
        assert!(jobs.borrow().is_empty());

        let job = Job::new("Riverside", "user-1");
        store.insert_job(&job).await.unwrap();

        jobs.changed().await.unwrap();
        assert_eq!(jobs.borrow().len(), 1);

        store.delete_job(job.id).await.unwrap();
        jobs.changed().await.unwrap();
        assert!(jobs.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_two_subscribers_share_one_snapshot_stream() {
        let store = MemoryDocumentStore::new();
        let first = store.subscribe("user-1").await.unwrap();
        let second = store.subscribe("user-1").await.unwrap();

        store.insert_job(&Job::new("Riverside", "user-1")).await.unwrap();

        assert_eq!(first.borrow().len(), 1);
        assert_eq!(second.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_update_items_requires_existing_job() {
        let store = MemoryDocumentStore::new();
        let item = PunchlistItem::new(
            ItemFields {
                room: "101".to_string(),
                description: "leak".to_string(),
                category: "Division 22 - Plumbing".to_string(),
            },
            PhotoRef::Remote("memory://x".to_string()),
        );
        assert!(store.update_items(Uuid::new_v4(), &[item]).await.is_err());
    }

    #[tokio::test]
    async fn test_object_round_trip_and_poisoning() {
        let store = MemoryObjectStore::new();
        let blob = PhotoBlob::new(vec![1, 2, 3], "a.jpg", "image/jpeg");

        let url = store.put(&blob, "images/u/j/a.jpg").await.unwrap();
        assert_eq!(url, "memory://images/u/j/a.jpg");
        assert!(store.contains(&url).await);

        store.fail_delete_of(&url).await;
        assert!(store.delete(&url).await.is_err());
        assert!(store.contains(&url).await);
    }

    #[tokio::test]
    async fn test_deleting_unknown_object_is_an_error() {
        let store = MemoryObjectStore::new();
        assert!(store.delete("memory://missing").await.is_err());
    }
}
