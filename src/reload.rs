//! Live-reload signals.
//!
//! After a watch cycle the scheduler calls a [`ReloadNotifier`] exactly once:
//! either a full page reload or a style injection carrying the stylesheets
//! the cycle wrote. How the signal reaches a browser is up to the
//! implementation.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;

/// A stylesheet written by a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleSheet {
    /// Where the file was written
    pub path: PathBuf,
    /// Path below the destination root with `/` separators, e.g.
    /// `assets/css/style.css`
    pub url: String,
}

impl StyleSheet {
    /// Describe a written file relative to the destination root.
    ///
    /// Files outside the root keep their file name as the URL.
    pub fn from_output(dest_root: &Path, path: &Path) -> Self {
        let relative = path.strip_prefix(dest_root).unwrap_or(path);
        let url = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        Self { path: path.to_path_buf(), url }
    }
}

/// One reload signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "sheets", rename_all = "snake_case")]
pub enum ReloadEvent {
    FullReload,
    StyleInject(Vec<StyleSheet>),
}

impl ReloadEvent {
    /// `reload` or `inject`.
    pub fn kind(&self) -> &'static str {
        match self {
            ReloadEvent::FullReload => "reload",
            ReloadEvent::StyleInject(_) => "inject",
        }
    }
}

/// Pushes reload signals to connected clients.
pub trait ReloadNotifier: Send + Sync {
    fn notify_full_reload(&self);

    fn notify_style_inject(&self, sheets: &[StyleSheet]);

    /// Dispatch an event to the matching method.
    fn notify(&self, event: &ReloadEvent) {
        match event {
            ReloadEvent::FullReload => self.notify_full_reload(),
            ReloadEvent::StyleInject(sheets) => self.notify_style_inject(sheets),
        }
    }
}

/// Logs reload signals and does nothing else.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl ReloadNotifier for LogNotifier {
    fn notify_full_reload(&self) {
        tracing::info!("full reload");
    }

    fn notify_style_inject(&self, sheets: &[StyleSheet]) {
        let urls: Vec<&str> = sheets.iter().map(|s| s.url.as_str()).collect();
        tracing::info!(sheets = ?urls, "style inject");
    }
}

/// Sends every signal as a [`ReloadEvent`] on a channel.
#[derive(Debug)]
pub struct ChannelNotifier {
    tx: Sender<ReloadEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<ReloadEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: ReloadEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("reload receiver dropped");
        }
    }
}

impl ReloadNotifier for ChannelNotifier {
    fn notify_full_reload(&self) {
        self.send(ReloadEvent::FullReload);
    }

    fn notify_style_inject(&self, sheets: &[StyleSheet]) {
        self.send(ReloadEvent::StyleInject(sheets.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_stylesheet_url() {
        let sheet = StyleSheet::from_output(
            Path::new("/site/dest"),
            Path::new("/site/dest/assets/css/style.css"),
        );
        assert_eq!(sheet.url, "assets/css/style.css");

        let outside = StyleSheet::from_output(Path::new("/site/dest"), Path::new("/tmp/x.css"));
        assert_eq!(outside.url, "tmp/x.css");
    }

    #[test]
    fn test_channel_notifier_dispatch() {
        let (tx, rx) = channel();
        let notifier = ChannelNotifier::new(tx);
        let sheet = StyleSheet::from_output(Path::new("/d"), Path::new("/d/a.css"));

        notifier.notify(&ReloadEvent::FullReload);
        notifier.notify_style_inject(std::slice::from_ref(&sheet));

        assert_eq!(rx.recv().unwrap(), ReloadEvent::FullReload);
        assert_eq!(rx.recv().unwrap(), ReloadEvent::StyleInject(vec![sheet]));
    }

    #[test]
    fn test_channel_notifier_survives_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);
        ChannelNotifier::new(tx).notify_full_reload();
    }

    #[test]
    fn test_event_json() {
        let json = serde_json::to_string(&ReloadEvent::FullReload).unwrap();
        assert_eq!(json, r#"{"type":"full_reload"}"#);
        assert_eq!(ReloadEvent::StyleInject(vec![]).kind(), "inject");
    }
}
