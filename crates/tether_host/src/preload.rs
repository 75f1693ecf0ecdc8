use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Once;

use anyhow::Context;
use serde_json::Value;
use tether_core::{channel, ConfigUpdate, Loader, LoaderConfig};

use crate::dir::DirTransport;

static INIT: Once = Once::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG`. Only the first call has
/// any effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        // Another subscriber may already be installed by the embedding program
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A loader whose locations under `config.cwd` are files under `root`.
pub fn dir_loader(root: impl Into<PathBuf>, config: LoaderConfig) -> Loader {
    let (sender, receiver) = channel();
    let transport = DirTransport::new(root, config.cwd.clone(), sender);
    Loader::new(config, transport, receiver)
}

/// Read a JSON configuration update from disk.
pub async fn read_config(path: &Path) -> anyhow::Result<ConfigUpdate> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    let update = ConfigUpdate::from_json(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(update)
}

/// Request `ids`, drive the loader until nothing is in flight, and return the
/// exports in request order.
pub async fn preload<I, S>(loader: &mut Loader, ids: I) -> anyhow::Result<Vec<Option<Value>>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let slot: Rc<RefCell<Option<Vec<Option<Value>>>>> = Rc::default();
    let sink = slot.clone();
    loader.request(ids, move |_, exports| {
        *sink.borrow_mut() = Some(exports);
    });

    loader.run().await.context("driving the loader")?;

    let exports = slot.borrow_mut().take();
    exports.context("request still pending after all fetches completed")
}
