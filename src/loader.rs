//! Catalog and lesson retrieval.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::model::{Catalog, Lesson, LessonDocument};

pub const CATALOG_FILE: &str = "index.json";

/// Characters escaped when a lesson id becomes a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug)]
pub enum LoadError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Status {
        url: String,
        status: u16,
    },
    Transport(String),
    Decode {
        origin: String,
        source: serde_json::Error,
    },
    InvalidId(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            LoadError::Status { url, status } => write!(f, "{url} answered with status {status}"),
            LoadError::Transport(reason) => write!(f, "request failed: {reason}"),
            LoadError::Decode { origin, source } => write!(f, "invalid JSON in {origin}: {source}"),
            LoadError::InvalidId(id) => write!(f, "invalid lesson id {id:?}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { source, .. } => Some(source),
            LoadError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Where lessons come from.
pub trait LessonSource {
    fn catalog(&self) -> impl Future<Output = Result<Catalog, LoadError>> + Send;

    fn lesson(&self, id: &str) -> impl Future<Output = Result<Lesson, LoadError>> + Send;
}

fn decode<T: DeserializeOwned>(bytes: &[u8], origin: impl Into<String>) -> Result<T, LoadError> {
    serde_json::from_slice(bytes).map_err(|source| LoadError::Decode {
        origin: origin.into(),
        source,
    })
}

fn check_id(id: &str) -> Result<(), LoadError> {
    if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
        return Err(LoadError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Location of `<id>.json` below `base`.
pub fn lesson_url(base: &Url, id: &str) -> Result<Url, LoadError> {
    check_id(id)?;
    let segment = format!("{}.json", utf8_percent_encode(id, SEGMENT));
    base.join(&segment)
        .map_err(|err| LoadError::Transport(format!("cannot build lesson url: {err}")))
}

/// Reads `index.json` and `<id>.json` from a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    async fn read(&self, file: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.root.join(file);
        debug!(path = %path.display(), "reading lesson data");
        tokio::fs::read(&path)
            .await
            .map_err(|source| LoadError::Io { path, source })
    }
}

impl LessonSource for DirectorySource {
    async fn catalog(&self) -> Result<Catalog, LoadError> {
        let bytes = self.read(CATALOG_FILE).await?;
        decode(&bytes, CATALOG_FILE)
    }

    async fn lesson(&self, id: &str) -> Result<Lesson, LoadError> {
        check_id(id)?;
        let file = format!("{id}.json");
        let bytes = self.read(&file).await?;
        let document: LessonDocument = decode(&bytes, file)?;
        Ok(Lesson::from_document(id, document))
    }
}

/// Fetches lesson data over HTTP, bypassing caches.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base: Url,
}

#[cfg(feature = "http")]
impl HttpSource {
    /// `base` is the data folder; a missing trailing slash is added so relative joins
    /// stay inside it.
    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn fetch(&self, url: Url) -> Result<Vec<u8>, LoadError> {
        debug!(%url, "fetching lesson data");
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|err| LoadError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| LoadError::Transport(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(feature = "http")]
impl LessonSource for HttpSource {
    async fn catalog(&self) -> Result<Catalog, LoadError> {
        let url = self
            .base
            .join(CATALOG_FILE)
            .map_err(|err| LoadError::Transport(err.to_string()))?;
        let bytes = self.fetch(url.clone()).await?;
        decode(&bytes, url.as_str())
    }

    async fn lesson(&self, id: &str) -> Result<Lesson, LoadError> {
        let url = lesson_url(&self.base, id)?;
        let bytes = self.fetch(url.clone()).await?;
        let document: LessonDocument = decode(&bytes, url.as_str())?;
        Ok(Lesson::from_document(id, document))
    }
}
