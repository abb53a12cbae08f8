//! Where package lists come from

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use autopilot_types::AppInfo;
use std::collections::BTreeMap;
use tokio::process::Command;
use tracing::debug;

/// Lists installed applications
#[async_trait]
pub trait PackageSource: Send + Sync {
    async fn list_packages(&self) -> Result<Vec<AppInfo>>;
}

/// Lists packages through the platform package manager (`pm list packages`)
#[derive(Debug, Clone)]
pub struct PmPackageSource {
    program: String,
}

impl PmPackageSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn list(&self, filter: &str) -> Result<Vec<String>> {
        let output = Command::new(&self.program)
            .args(["list", "packages", filter])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ScanError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ScanError::CommandFailed {
                program: self.program.clone(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let packages = parse_package_list(&String::from_utf8_lossy(&output.stdout));
        debug!("{} list packages {}: {} entries", self.program, filter, packages.len());
        Ok(packages)
    }
}

impl Default for PmPackageSource {
    fn default() -> Self {
        Self::new("pm")
    }
}

#[async_trait]
impl PackageSource for PmPackageSource {
    async fn list_packages(&self) -> Result<Vec<AppInfo>> {
        let third_party = self.list("-3").await?;
        let system = self.list("-s").await?;
        Ok(merge_lists(third_party, system))
    }
}

/// Combine both listings; a package reported by both is a system app
pub(crate) fn merge_lists(third_party: Vec<String>, system: Vec<String>) -> Vec<AppInfo> {
    let mut apps = BTreeMap::new();
    for package in third_party {
        apps.insert(package.clone(), AppInfo::new(package));
    }
    for package in system {
        apps.insert(package.clone(), AppInfo::system(package));
    }
    apps.into_values().collect()
}

/// Extract package names from `package:<name>` lines
pub(crate) fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|name| {
            // `pm list packages -f` prints `package:<apk path>=<name>`
            name.rsplit_once('=').map_or(name, |(_, pkg)| pkg).trim()
        })
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_list() {
        let output = "package:com.android.settings\r\n\
                      package:tv.danmaku.bili\n\
                      WARNING: linker: something\n\
                      package:/data/app/base.apk=com.tencent.mm\n\
                      package:\n";
        assert_eq!(
            parse_package_list(output),
            vec!["com.android.settings", "tv.danmaku.bili", "com.tencent.mm"]
        );
    }

    #[test]
    fn test_merge_marks_system_apps() {
        let apps = merge_lists(
            vec!["tv.danmaku.bili".into(), "com.android.chrome".into()],
            vec!["com.android.settings".into(), "com.android.chrome".into()],
        );

        assert_eq!(apps.len(), 3);
        let system: Vec<&str> = apps
            .iter()
            .filter(|a| a.system)
            .map(|a| a.package.as_str())
            .collect();
        assert_eq!(system, vec!["com.android.chrome", "com.android.settings"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let source = PmPackageSource::new("/nonexistent/autopilot-pm");
        assert!(matches!(
            source.list_packages().await,
            Err(ScanError::Spawn { .. })
        ));
    }
}
