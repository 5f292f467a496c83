use crate::error::OverlayError;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Supplies the boundary polygon document for a region code.
#[allow(async_fn_in_trait)]
pub trait BoundarySource {
    async fn load(&self, region: &str) -> Result<Value, OverlayError>;
}

/// One GeoJSON file per region: `<dir>/<region>.json`.
pub struct FsBoundaries {
    dir: PathBuf,
}

impl FsBoundaries {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        FsBoundaries { dir: dir.into() }
    }
}

impl BoundarySource for FsBoundaries {
    async fn load(&self, region: &str) -> Result<Value, OverlayError> {
        if region.is_empty() || region.contains(['/', '\\', '.']) {
            return Err(OverlayError::Missing(region.to_string()));
        }
        let path = self.dir.join(format!("{}.json", region));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OverlayError::Missing(region.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let boundary = serde_json::from_str(&content)?;
        info!("Loaded boundary for region {} from {}", region, path.display());
        Ok(boundary)
    }
}

/// In-memory boundaries that count how often each region is loaded.
#[derive(Default)]
pub struct MemoryBoundaries {
    documents: HashMap<String, Value>,
    loads: RefCell<HashMap<String, usize>>,
}

impl MemoryBoundaries {
    pub fn with(mut self, region: &str, boundary: Value) -> Self {
        self.documents.insert(region.to_string(), boundary);
        self
    }

    pub fn load_count(&self, region: &str) -> usize {
        self.loads.borrow().get(region).copied().unwrap_or(0)
    }
}

impl BoundarySource for MemoryBoundaries {
    async fn load(&self, region: &str) -> Result<Value, OverlayError> {
        *self.loads.borrow_mut().entry(region.to_string()).or_insert(0) += 1;
        self.documents
            .get(region)
            .cloned()
            .ok_or_else(|| OverlayError::Missing(region.to_string()))
    }
}
