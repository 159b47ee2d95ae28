//! File-backed storage implementation
//!
//! Layout under the root directory:
//!
//! ```text
//! plans/<plan>.json                 one record per plan, replaced on save
//! certifications/<plan>.jsonl       one certification per line, appended
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use stagehand_types::{Certification, PlanId};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::traits::*;
use crate::{PlanRecord, StoreError, StoreResult};

/// Stores plans and certifications as JSON files under one directory
#[derive(Debug)]
pub struct FilePlanStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePlanStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("plans")).await?;
        fs::create_dir_all(root.join("certifications")).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn plan_path(&self, plan_id: &PlanId) -> PathBuf {
        self.root.join("plans").join(format!("{}.json", file_stem(plan_id)))
    }

    fn certifications_path(&self, plan_id: &PlanId) -> PathBuf {
        self.root
            .join("certifications")
            .join(format!("{}.jsonl", file_stem(plan_id)))
    }

    async fn read_certifications(path: &Path) -> StoreResult<Vec<Certification>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }

    async fn files_with_extension(&self, dir: &str, extension: &str) -> StoreResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(self.root.join(dir)).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(extension) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Plan ids are used as file names only when they are plainly safe.
fn file_stem(plan_id: &PlanId) -> String {
    let id = plan_id.as_str();
    let safe = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if safe {
        id.to_string()
    } else {
        format!("h-{}", &blake3::hash(id.as_bytes()).to_hex()[..32])
    }
}

#[async_trait]
impl PlanStorage for FilePlanStore {
    async fn save_plan(&self, record: &PlanRecord) -> StoreResult<()> {
        let encoded = serde_json::to_vec_pretty(record)?;
        let path = self.plan_path(record.id());
        let tmp = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().await;
        fs::write(&tmp, encoded).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load_plan(&self, plan_id: &PlanId) -> StoreResult<Option<PlanRecord>> {
        match fs::read(self.plan_path(plan_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_plans(&self) -> StoreResult<Vec<PlanId>> {
        let mut ids = Vec::new();
        for path in self.files_with_extension("plans", "json").await? {
            let bytes = fs::read(&path).await?;
            let record: PlanRecord = serde_json::from_slice(&bytes)?;
            ids.push(record.plan.id);
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl CertificationStorage for FilePlanStore {
    async fn append_certification(&self, certification: &Certification) -> StoreResult<()> {
        let path = self.certifications_path(&certification.plan_id);
        let mut line = serde_json::to_string(certification)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let existing = Self::read_certifications(&path).await?;
        if existing.iter().any(|c| c.attempt == certification.attempt) {
            return Err(StoreError::Immutable {
                plan_id: certification.plan_id.clone(),
                attempt: certification.attempt,
            });
        }

        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn certifications(&self, plan_id: &PlanId) -> StoreResult<Vec<Certification>> {
        let mut records = Self::read_certifications(&self.certifications_path(plan_id)).await?;
        records.sort_by_key(|c| c.attempt);
        Ok(records)
    }

    async fn all_certifications(&self) -> StoreResult<Vec<Certification>> {
        let mut records = Vec::new();
        for path in self.files_with_extension("certifications", "jsonl").await? {
            records.extend(Self::read_certifications(&path).await?);
        }
        records.sort_by(|a, b| (&a.plan_id, a.attempt).cmp(&(&b.plan_id, b.attempt)));
        Ok(records)
    }
}

impl PlanStore for FilePlanStore {}
