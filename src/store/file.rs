use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::csr::{CertificateSigningRequest, CsrCondition};
use crate::error::Error;
use crate::store::RequestStore;
use crate::types::Result;

/// Directory-backed request store. Each request lives in `<dir>/<name>.json`
/// in the cluster API's JSON shape.
pub struct FileRequestStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on status updates
    write_lock: Mutex<()>,
}

impl FileRequestStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub async fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Store(format!("Failed to create {}: {}", dir.display(), e)))?;

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn request_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.starts_with('.') || name.contains(|c: char| c == '/' || c == '\\') {
            return Err(Error::Store(format!("Invalid request name: {:?}", name)));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }

    async fn read_request(path: &Path) -> Result<Option<CertificateSigningRequest>> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Store(format!("Failed to read {}: {}", path.display(), e)));
            }
        };

        let csr = serde_json::from_slice(&content)
            .map_err(|e| Error::Store(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(Some(csr))
    }

    /// Write a request, replacing any existing one
    pub async fn write_request(&self, csr: &CertificateSigningRequest) -> Result<()> {
        let path = self.request_path(csr.name())?;
        let content = serde_json::to_vec_pretty(csr)?;

        // Write then rename so readers never observe a partial document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| Error::Store(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Store(format!("Failed to replace {}: {}", path.display(), e)))?;

        debug!("Saved request to file: {:?}", path);
        Ok(())
    }
}

#[async_trait]
impl RequestStore for FileRequestStore {
    async fn get(&self, name: &str) -> Result<Option<CertificateSigningRequest>> {
        let path = self.request_path(name)?;
        Self::read_request(&path).await
    }

    async fn list(&self) -> Result<Vec<CertificateSigningRequest>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::Store(format!("Failed to read request directory: {}", e)))?;

        let mut requests = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Store(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().map(|ext| ext != "json").unwrap_or(true) {
                continue;
            }

            match Self::read_request(&path).await {
                Ok(Some(csr)) => requests.push(csr),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable request file: {}", e),
            }
        }

        requests.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(requests)
    }

    async fn update_status(&self, name: &str, condition: CsrCondition) -> Result<()> {
        let path = self.request_path(name)?;
        let _guard = self.write_lock.lock().await;

        let mut csr = Self::read_request(&path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("certificate signing request {}", name)))?;
        if let Some(decision) = csr.decision() {
            return Err(Error::Conflict(format!(
                "certificate signing request {} is already {}",
                name, decision
            )));
        }

        let version = csr
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        csr.metadata.resource_version = Some((version + 1).to_string());
        csr.status.conditions.push(condition);

        self.write_request(&csr).await
    }
}
