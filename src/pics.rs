//! PICS (Protocol Implementation Conformance Statement) metadata.
//!
//! Test definitions guard steps with PICS expressions such as
//! `OO.S.A4003 && !OO.S.F02`. Every code used there must exist in the PICS
//! metafile. The metafile is loaded through a [`PicsLoader`] and memoized in a
//! [`PicsCache`] owned by whoever needs it.

#[cfg(feature = "napi")]
use napi_derive::napi;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ConformanceError, ERR_PICS_LOAD, ERR_PICS_UNDEFINED};

lazy_static! {
    static ref PICS_SEPARATOR_RE: Regex = Regex::new(r"[&|() !]+").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// DATABASE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PicsItem {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct PicsDocument {
    #[serde(rename = "PICS", default)]
    pics: Vec<PicsItem>,
}

#[derive(Debug, Clone)]
pub struct PicsDatabase {
    items: Vec<PicsItem>,
    index: HashMap<String, usize>,
    source_hash: String,
}

pub fn compute_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl PicsDatabase {
    pub fn from_yaml(source: &str) -> Result<Self, ConformanceError> {
        let document: PicsDocument = serde_yaml::from_str(source).map_err(|e| {
            ConformanceError::new(ERR_PICS_LOAD, format!("invalid PICS metafile: {}", e), "")
        })?;

        let mut index = HashMap::new();
        for (position, item) in document.pics.iter().enumerate() {
            // the first definition of a code wins
            index.entry(item.id.clone()).or_insert(position);
        }

        Ok(PicsDatabase {
            items: document.pics,
            index,
            source_hash: compute_hash(source),
        })
    }

    pub fn get_all(&self) -> &[PicsItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&PicsItem> {
        self.index.get(id).map(|&position| &self.items[position])
    }

    pub fn has(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn source_hash(&self) -> &str {
        &self.source_hash
    }
}

/// Check that every PICS code in `expression` is defined in `database`.
pub fn validate_pics_expression(
    expression: &str,
    database: &PicsDatabase,
) -> Result<(), ConformanceError> {
    for code in PICS_SEPARATOR_RE.split(expression).filter(|c| !c.is_empty()) {
        if !database.has(code) {
            return Err(ConformanceError::new(
                ERR_PICS_UNDEFINED,
                format!("PICS database does not contain any defined value for: {}", code),
                expression,
            )
            .with_element(code));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADING & CACHING
// ═══════════════════════════════════════════════════════════════════════════════

pub trait PicsLoader {
    /// Read the raw metafile.
    fn load(&self) -> Result<String, ConformanceError>;

    fn describe(&self) -> String;
}

pub struct FilePicsLoader {
    path: PathBuf,
}

impl FilePicsLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PicsLoader for FilePicsLoader {
    fn load(&self) -> Result<String, ConformanceError> {
        fs::read_to_string(&self.path).map_err(|e| {
            ConformanceError::new(
                ERR_PICS_LOAD,
                format!("cannot read {}: {}", self.path.display(), e),
                "",
            )
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct PicsCache<L: PicsLoader> {
    loader: L,
    loaded: Option<Arc<PicsDatabase>>,
}

impl<L: PicsLoader> PicsCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            loaded: None,
        }
    }

    fn load(&self) -> Result<Arc<PicsDatabase>, ConformanceError> {
        let source = self.loader.load().map_err(|e| {
            warn!(source = %self.loader.describe(), error = %e, "PICS load failed");
            e
        })?;
        let database = PicsDatabase::from_yaml(&source)?;
        debug!(source = %self.loader.describe(), items = database.items.len(), "PICS loaded");
        Ok(Arc::new(database))
    }

    /// The memoized database, loading it on first use.
    pub fn get(&mut self) -> Result<Arc<PicsDatabase>, ConformanceError> {
        if let Some(database) = &self.loaded {
            return Ok(Arc::clone(database));
        }
        let database = self.load()?;
        self.loaded = Some(Arc::clone(&database));
        Ok(database)
    }

    pub fn invalidate(&mut self) {
        self.loaded = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Re-read the source and swap the memo if its content changed.
    pub fn refresh(&mut self) -> Result<bool, ConformanceError> {
        let source = self.loader.load()?;
        let hash = compute_hash(&source);
        if let Some(current) = &self.loaded {
            if current.source_hash == hash {
                return Ok(false);
            }
        }
        self.loaded = Some(Arc::new(PicsDatabase::from_yaml(&source)?));
        Ok(true)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub struct PicsStore {
    cache: PicsCache<FilePicsLoader>,
}

#[cfg(feature = "napi")]
#[napi]
impl PicsStore {
    #[napi(constructor)]
    pub fn new(path: String) -> Self {
        PicsStore {
            cache: PicsCache::new(FilePicsLoader::new(path)),
        }
    }

    #[napi]
    pub fn has(&mut self, id: String) -> napi::Result<bool> {
        let database = self.database()?;
        Ok(database.has(&id))
    }

    #[napi]
    pub fn get_all(&mut self) -> napi::Result<serde_json::Value> {
        let database = self.database()?;
        serde_json::to_value(database.get_all()).map_err(|e| napi::Error::from_reason(e.to_string()))
    }

    #[napi]
    pub fn validate(&mut self, expression: String) -> napi::Result<()> {
        let database = self.database()?;
        validate_pics_expression(&expression, &database)
            .map_err(|e| napi::Error::from_reason(e.to_string()))
    }

    #[napi]
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    #[napi]
    pub fn refresh(&mut self) -> napi::Result<bool> {
        self.cache
            .refresh()
            .map_err(|e| napi::Error::from_reason(e.to_string()))
    }

    fn database(&mut self) -> napi::Result<Arc<PicsDatabase>> {
        self.cache
            .get()
            .map_err(|e| napi::Error::from_reason(e.to_string()))
    }
}
