//! Project file operations, scoped to `<tenant>/<project>/`

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::access::gate::CapabilityGate;

use super::error::{DataError, DataResult};
use super::record::check_id;

/// Capability required to upload or remove project files
pub const FILES_WRITE: &str = "files.write";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    pub name: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Object storage seam; paths are full `<tenant>/<project>/<name>` keys
#[async_trait]
pub trait FileBackend: Send + Sync {
    async fn upload(&self, path: String, body: Bytes, content_type: String) -> DataResult<StoredFile>;

    /// Files directly under `folder`, names relative to it
    async fn list(&self, folder: String) -> DataResult<Vec<StoredFile>>;

    /// `false` when nothing was stored at `path`
    async fn remove(&self, path: String) -> DataResult<bool>;
}

#[derive(Clone)]
struct FolderBinding {
    tenant_id: String,
    folder: String,
    actor: String,
}

/// File operations for one project
#[derive(Clone)]
pub struct ProjectFiles {
    binding: Result<FolderBinding, DataError>,
    backend: Arc<dyn FileBackend>,
    gate: Arc<dyn CapabilityGate>,
}

impl ProjectFiles {
    pub fn bound(
        tenant_id: &str,
        project_id: &str,
        actor: impl Into<String>,
        backend: Arc<dyn FileBackend>,
        gate: Arc<dyn CapabilityGate>,
    ) -> Self {
        let binding = check_id("tenant", tenant_id)
            .and_then(|_| check_id("project", project_id))
            .map(|_| FolderBinding {
                tenant_id: tenant_id.to_string(),
                folder: format!("{}/{}", tenant_id, project_id),
                actor: actor.into(),
            });
        Self { binding, backend, gate }
    }

    pub fn unbound(reason: DataError, backend: Arc<dyn FileBackend>, gate: Arc<dyn CapabilityGate>) -> Self {
        Self {
            binding: Err(reason),
            backend,
            gate,
        }
    }

    fn binding(&self) -> DataResult<&FolderBinding> {
        self.binding.as_ref().map_err(|err| err.clone())
    }

    pub async fn upload(&self, name: &str, body: Bytes, content_type: &str) -> DataResult<StoredFile> {
        let binding = self.binding()?;
        check_name(name)?;
        self.gate
            .authorize(&binding.tenant_id, &binding.actor, FILES_WRITE)
            .await?;

        let size = body.len();
        let stored = self
            .backend
            .upload(
                format!("{}/{}", binding.folder, name),
                body,
                content_type.to_string(),
            )
            .await?;

        info!(folder = %binding.folder, name, size, "Uploaded project file");
        Ok(stored)
    }

    /// Files in the project folder, sorted by name
    pub async fn list(&self) -> DataResult<Vec<StoredFile>> {
        let binding = self.binding()?;
        let mut files = self.backend.list(binding.folder.clone()).await?;
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    pub async fn remove(&self, name: &str) -> DataResult<()> {
        let binding = self.binding()?;
        check_name(name)?;
        self.gate
            .authorize(&binding.tenant_id, &binding.actor, FILES_WRITE)
            .await?;

        let path = format!("{}/{}", binding.folder, name);
        if !self.backend.remove(path).await? {
            return Err(DataError::NotFound(format!(
                "file '{}' in {}",
                name, binding.folder
            )));
        }
        Ok(())
    }
}

fn check_name(name: &str) -> DataResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(char::is_control);
    if bad {
        return Err(DataError::Invalid(format!("bad file name '{}'", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::gate::AllowAll;
    use crate::data::demo::DemoBackend;

    fn files(tenant: &str, project: &str, backend: Arc<DemoBackend>) -> ProjectFiles {
        ProjectFiles::bound(tenant, project, "user-1", backend, Arc::new(AllowAll))
    }

    #[tokio::test]
    async fn files_are_isolated_per_project() {
        let backend = Arc::new(DemoBackend::empty());
        let p1 = files("acme", "p1", backend.clone());
        let p2 = files("acme", "p2", backend);

        p1.upload("plan.pdf", Bytes::from_static(b"%PDF-1.7"), "application/pdf")
            .await
            .unwrap();
        p1.upload("photo.jpg", Bytes::from_static(b"\xff\xd8"), "image/jpeg")
            .await
            .unwrap();

        let names: Vec<String> = p1.list().await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["photo.jpg", "plan.pdf"]);
        assert!(p2.list().await.unwrap().is_empty());
        assert!(matches!(
            p2.remove("plan.pdf").await,
            Err(DataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_path_like_names() {
        let p1 = files("acme", "p1", Arc::new(DemoBackend::empty()));
        for name in ["", "..", "../p2/plan.pdf", "a/b"] {
            assert!(matches!(
                p1.upload(name, Bytes::new(), "text/plain").await,
                Err(DataError::Invalid(_))
            ));
        }
    }

    #[tokio::test]
    async fn remove_then_remove_again_is_not_found() {
        let p1 = files("acme", "p1", Arc::new(DemoBackend::empty()));
        p1.upload("notes.txt", Bytes::from_static(b"hi"), "text/plain")
            .await
            .unwrap();

        p1.remove("notes.txt").await.unwrap();
        assert!(matches!(
            p1.remove("notes.txt").await,
            Err(DataError::NotFound(_))
        ));
    }
}
