//! Directory-backed transport.

use std::path::{Component, Path, PathBuf};

use tether_core::transport::CompletionSender;
use tether_core::{Completion, FetchError, FetchRequest, Payload, Transport};

/// Serves locations under `prefix` from files under `root`.
///
/// Each request is read on its own tokio task, so `request` must be called
/// from within a runtime. `.json` files complete as [`Payload::Json`],
/// everything else as [`Payload::Text`].
pub struct DirTransport {
    root: PathBuf,
    prefix: String,
    sender: CompletionSender,
}

impl DirTransport {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>, sender: CompletionSender) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            sender,
        }
    }

    /// File backing `location`, if it lies under the prefix. Query and
    /// fragment are ignored; paths climbing out of the root are refused.
    pub fn path_for(&self, location: &str) -> Option<PathBuf> {
        let relative = location.strip_prefix(&self.prefix)?;
        let relative = relative
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default();

        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl Transport for DirTransport {
    fn request(&mut self, request: FetchRequest) {
        let location = request.request_location;
        let sender = self.sender.clone();

        let Some(path) = self.path_for(&location) else {
            tracing::debug!(%location, "outside the served directory");
            let error = FetchError::NotFound {
                location: location.clone(),
            };
            if sender.send(Completion::failed(location, error)).is_err() {
                tracing::warn!("completion receiver dropped; request discarded");
            }
            return;
        };

        tokio::spawn(async move {
            tracing::debug!(%location, path = %path.display(), "reading");
            let outcome = read(&location, &path).await;
            if sender.send(Completion { location, outcome }).is_err() {
                tracing::warn!("completion receiver dropped; request discarded");
            }
        });
    }
}

async fn read(location: &str, path: &Path) -> Result<Payload, FetchError> {
    let bytes = tokio::fs::read(path).await.map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => FetchError::NotFound {
            location: location.to_string(),
        },
        _ => FetchError::Io {
            location: location.to_string(),
            message: err.to_string(),
        },
    })?;

    let decode = |message: String| FetchError::Decode {
        location: location.to_string(),
        message,
    };
    let text = String::from_utf8(bytes).map_err(|err| decode(err.to_string()))?;

    if path.extension().is_some_and(|ext| ext == "json") {
        let value = serde_json::from_str(&text).map_err(|err| decode(err.to_string()))?;
        Ok(Payload::Json(value))
    } else {
        Ok(Payload::Text(text))
    }
}
