/// Tab and window data used by the coordinator
use crate::error::HandshakeError;
use crate::pending::{PendingMap, PendingReply};
use serde::{Deserialize, Serialize};

pub type TabId = i32;
pub type WindowId = i32;

/// One entry of a layout to reopen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabSpec {
    pub url: String,
    #[serde(default)]
    pub pinned: bool,
}

impl TabSpec {
    pub fn new(url: &str, pinned: bool) -> TabSpec {
        TabSpec {
            url: url.to_string(),
            pinned,
        }
    }
}

/// Drop entries that have nothing to open
pub fn restorable(tabs: Vec<TabSpec>) -> Vec<TabSpec> {
    tabs.into_iter()
        .filter(|tab| !tab.url.trim().is_empty())
        .collect()
}

/// `status` of a tabs.onUpdated change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabStatus {
    Loading,
    Complete,
    Unloaded,
}

impl TabStatus {
    pub fn parse(s: &str) -> Option<TabStatus> {
        match s {
            "loading" => Some(TabStatus::Loading),
            "complete" => Some(TabStatus::Complete),
            "unloaded" => Some(TabStatus::Unloaded),
            _ => None,
        }
    }
}

/// One-shot "tab finished loading" watches, one per tab
#[derive(Clone, Default)]
pub struct LoadWaiters {
    waiters: PendingMap<TabId, ()>,
}

impl LoadWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self, tab_id: TabId) -> Result<PendingReply<TabId, ()>, HandshakeError> {
        self.waiters.register(tab_id)
    }

    /// Feed a navigation event. Only `complete` for a watched tab fires,
    /// and it fires the watch at most once.
    pub fn on_updated(&self, tab_id: TabId, status: Option<TabStatus>) -> bool {
        match status {
            Some(TabStatus::Complete) => self.waiters.resolve(&tab_id, ()),
            _ => false,
        }
    }

    pub fn is_watching(&self, tab_id: TabId) -> bool {
        self.waiters.contains(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restorable_drops_blank_urls() {
        let tabs = vec![
            TabSpec::new("https://google.com", false),
            TabSpec::new("", true),
            TabSpec::new("   ", false),
            TabSpec::new("https://github.com", true),
        ];

        let kept = restorable(tabs);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].url, "https://google.com");
        assert!(kept[1].pinned);
    }

    #[test]
    fn test_tab_spec_pinned_defaults_false() {
        let tab: TabSpec = serde_json::from_str(r#"{"url": "a"}"#).unwrap();
        assert_eq!(tab, TabSpec::new("a", false));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(TabStatus::parse("complete"), Some(TabStatus::Complete));
        assert_eq!(TabStatus::parse("loading"), Some(TabStatus::Loading));
        assert_eq!(TabStatus::parse("weird"), None);
    }

    #[test]
    fn test_only_complete_for_watched_tab_fires() {
        let loads = LoadWaiters::new();
        let _watch = loads.watch(5).unwrap();

        assert!(!loads.on_updated(5, Some(TabStatus::Loading)));
        assert!(!loads.on_updated(6, Some(TabStatus::Complete)));
        assert!(!loads.on_updated(5, None));
        assert!(loads.is_watching(5));

        assert!(loads.on_updated(5, Some(TabStatus::Complete)));
        assert!(!loads.is_watching(5));
        // a reload of the same tab later is ignored
        assert!(!loads.on_updated(5, Some(TabStatus::Complete)));
    }
}
