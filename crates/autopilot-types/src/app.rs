use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::PackageId;

/// Install metadata for one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub package: PackageId,
    pub label: Option<String>,
    pub system: bool,
}

impl AppInfo {
    pub fn new(package: impl Into<PackageId>) -> Self {
        Self {
            package: package.into(),
            label: None,
            system: false,
        }
    }

    pub fn system(package: impl Into<PackageId>) -> Self {
        Self {
            system: true,
            ..Self::new(package)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Immutable point-in-time view of installed applications.
///
/// Snapshots are never mutated after construction; a refresh builds a new one
/// with the next generation number and replaces the old one wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSnapshot {
    apps: HashMap<PackageId, AppInfo>,
    generation: u64,
    scanned_at: Option<DateTime<Utc>>,
}

impl AppSnapshot {
    /// The snapshot visible before the first scan completes
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(generation: u64, apps: impl IntoIterator<Item = AppInfo>) -> Self {
        Self {
            apps: apps
                .into_iter()
                .map(|app| (app.package.clone(), app))
                .collect(),
            generation,
            scanned_at: Some(Utc::now()),
        }
    }

    /// Build a snapshot from bare package identifiers
    pub fn from_packages<I, S>(generation: u64, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PackageId>,
    {
        Self::new(generation, packages.into_iter().map(AppInfo::new))
    }

    pub fn contains(&self, package: &str) -> bool {
        self.apps.contains_key(package)
    }

    /// Whether every listed package is installed
    pub fn contains_all<'a>(&self, packages: impl IntoIterator<Item = &'a PackageId>) -> bool {
        packages.into_iter().all(|p| self.contains(p))
    }

    /// Packages from `packages` that are not installed, in iteration order
    pub fn missing<'a>(&self, packages: impl IntoIterator<Item = &'a PackageId>) -> Vec<PackageId> {
        packages
            .into_iter()
            .filter(|p| !self.contains(p))
            .cloned()
            .collect()
    }

    pub fn get(&self, package: &str) -> Option<&AppInfo> {
        self.apps.get(package)
    }

    pub fn apps(&self) -> impl Iterator<Item = &AppInfo> {
        self.apps.values()
    }

    /// Package identifiers sorted alphabetically
    pub fn packages(&self) -> Vec<&str> {
        let mut packages: Vec<&str> = self.apps.keys().map(String::as_str).collect();
        packages.sort_unstable();
        packages
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn scanned_at(&self) -> Option<DateTime<Utc>> {
        self.scanned_at
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = AppSnapshot::empty();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.generation(), 0);
        assert!(snapshot.scanned_at().is_none());
        assert!(snapshot.contains_all(std::iter::empty()));
    }

    #[test]
    fn test_contains_all_and_missing() {
        let snapshot = AppSnapshot::from_packages(3, ["com.android.settings", "com.tencent.mm"]);
        let required: Vec<PackageId> =
            vec!["com.android.settings".into(), "tv.danmaku.bili".into()];

        assert!(!snapshot.contains_all(&required));
        assert_eq!(snapshot.missing(&required), vec!["tv.danmaku.bili".to_string()]);
        assert!(snapshot.contains_all(&required[..1]));
    }

    #[test]
    fn test_packages_sorted() {
        let snapshot = AppSnapshot::from_packages(1, ["b.app", "a.app", "c.app"]);
        assert_eq!(snapshot.packages(), vec!["a.app", "b.app", "c.app"]);
    }

    #[test]
    fn test_app_info_builders() {
        let app = AppInfo::system("com.android.settings").with_label("Settings");
        assert!(app.system);
        assert_eq!(app.label.as_deref(), Some("Settings"));
    }
}
