use std::sync::{PoisonError, RwLock};

use workbench_common::PropertyBag;

use crate::error::CollaboratorError;

/// Exported state of one preference page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferencePageState {
    pub name: String,
    pub class_name: String,
    pub preferences: PropertyBag,
}

/// Preference pages that can export and re-import their values.
pub trait PreferenceRegistry: Send + Sync {
    /// Pages implementing the export capability, in registration order.
    fn exportable_pages(&self) -> Vec<PreferencePageState>;

    /// Apply saved values to the page registered under `class_name`.
    fn apply(&self, class_name: &str, preferences: &PropertyBag) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone)]
struct Page {
    state: PreferencePageState,
    exportable: bool,
}

/// In-memory preference pages.
#[derive(Debug, Default)]
pub struct PreferenceStore {
    pages: RwLock<Vec<Page>>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. Non-exportable pages can still be applied to but are
    /// never captured.
    pub fn register_page(&self, name: &str, class_name: &str, exportable: bool) {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        pages.retain(|p| p.state.class_name != class_name);
        pages.push(Page {
            state: PreferencePageState {
                name: name.to_string(),
                class_name: class_name.to_string(),
                preferences: PropertyBag::new(),
            },
            exportable,
        });
    }

    pub fn set(&self, class_name: &str, key: &str, value: &str) -> Result<(), CollaboratorError> {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        let page = pages
            .iter_mut()
            .find(|p| p.state.class_name == class_name)
            .ok_or_else(|| CollaboratorError::NotFound(class_name.to_string()))?;
        page.state.preferences.insert(key, value);
        Ok(())
    }

    pub fn get(&self, class_name: &str, key: &str) -> Option<String> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.state.class_name == class_name)
            .and_then(|p| p.state.preferences.get(key).map(str::to_string))
    }
}

impl PreferenceRegistry for PreferenceStore {
    fn exportable_pages(&self) -> Vec<PreferencePageState> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.exportable)
            .map(|p| p.state.clone())
            .collect()
    }

    fn apply(&self, class_name: &str, preferences: &PropertyBag) -> Result<(), CollaboratorError> {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        let page = pages
            .iter_mut()
            .find(|p| p.state.class_name == class_name)
            .ok_or_else(|| CollaboratorError::NotFound(class_name.to_string()))?;
        for (key, value) in preferences {
            page.state.preferences.insert(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exportable_pages_are_listed() {
        let store = PreferenceStore::new();
        store.register_page("Units", "prefs.Units", true);
        store.register_page("Colors", "prefs.Colors", false);
        let pages = store.exportable_pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].name, "Units");
    }

    #[test]
    fn apply_merges_values() {
        let store = PreferenceStore::new();
        store.register_page("Units", "prefs.Units", true);
        store.set("prefs.Units", "depth", "m").unwrap();
        store
            .apply("prefs.Units", &[("time", "ms")].into_iter().collect())
            .unwrap();
        assert_eq!(store.get("prefs.Units", "depth").as_deref(), Some("m"));
        assert_eq!(store.get("prefs.Units", "time").as_deref(), Some("ms"));
    }

    #[test]
    fn apply_to_unknown_page_fails() {
        let store = PreferenceStore::new();
        assert!(matches!(
            store.apply("prefs.Nope", &PropertyBag::new()),
            Err(CollaboratorError::NotFound(_))
        ));
    }
}
