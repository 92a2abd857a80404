use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants;
use crate::model::Error;

/// Top-level fields of `Chart.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub app_version: Option<String>,
}

/// Read-only view of a loaded chart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartBundle {
    pub metadata: ChartMetadata,
    pub values: serde_yaml::Value,
}

/// Directory holding the charts of one branch
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub resource_dir: PathBuf,
}

/// Provides the chart workspace of a branch
#[async_trait]
pub trait WorkspaceFactory: Send + Sync {
    async fn get(&self, branch: &str) -> Result<Workspace, Error>;
}

#[async_trait]
pub trait ChartLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<ChartBundle, Error>;
}

/// Workspaces already checked out under `<root>/<branch>/resources`
#[derive(Debug, Clone)]
pub struct LocalWorkspaceFactory {
    root: PathBuf,
}

impl LocalWorkspaceFactory {
    pub fn new(root: PathBuf) -> Self {
        LocalWorkspaceFactory { root }
    }
}

#[async_trait]
impl WorkspaceFactory for LocalWorkspaceFactory {
    async fn get(&self, branch: &str) -> Result<Workspace, Error> {
        let resource_dir = self.root.join(branch).join(constants::WORKSPACE_RESOURCE_DIR);
        if !tokio::fs::try_exists(&resource_dir).await? {
            return Err(Error::ConfigError(format!(
                "No chart workspace for branch {branch} in {}",
                self.root.display()
            )));
        }
        Ok(Workspace { resource_dir })
    }
}

/// Loads unpacked charts: `Chart.yaml` is mandatory, `values.yaml` optional
#[derive(Debug, Clone, Default)]
pub struct DirectoryChartLoader;

#[async_trait]
impl ChartLoader for DirectoryChartLoader {
    async fn load(&self, path: &Path) -> Result<ChartBundle, Error> {
        let definition = tokio::fs::read_to_string(path.join(constants::CHART_DEFINITION_FILE)).await?;
        let metadata: ChartMetadata = serde_yaml::from_str(&definition)?;

        let values_path = path.join(constants::CHART_VALUES_FILE);
        let values = if tokio::fs::try_exists(&values_path).await? {
            serde_yaml::from_str(&tokio::fs::read_to_string(&values_path).await?)?
        } else {
            serde_yaml::Value::Null
        };
        Ok(ChartBundle { metadata, values })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChartValues {
    #[serde(default)]
    global: GlobalValues,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalValues {
    #[serde(default)]
    images: ImageValues,
}

#[derive(Debug, Default, Deserialize)]
struct ImageValues {
    #[serde(default)]
    istio_pilot: ImageVersion,
}

#[derive(Debug, Default, Deserialize)]
struct ImageVersion {
    #[serde(default)]
    version: String,
}

/// Version pinned by `global.images.istio_pilot.version`, empty when unset
pub fn pilot_version_from_values(bundle: &ChartBundle) -> Result<String, Error> {
    if bundle.values.is_null() {
        return Ok(String::new());
    }
    let values: ChartValues = serde_yaml::from_value(bundle.values.clone())?;
    Ok(values.global.images.istio_pilot.version)
}

/// Determines the Istio version a chart targets.
///
/// The pilot version in the values overrides the chart's `appVersion`, so operators can pin a
/// release without editing the chart definition.
pub fn resolve_target_version(bundle: &ChartBundle) -> Result<String, Error> {
    let pilot_version = pilot_version_from_values(bundle)?;
    if !pilot_version.is_empty() {
        debug!("Resolved target Istio version: {pilot_version} from values");
        return Ok(pilot_version);
    }

    match bundle.metadata.app_version.as_deref() {
        Some(app_version) if !app_version.is_empty() => {
            debug!("Resolved target Istio version: {app_version} from Chart definition");
            Ok(app_version.to_owned())
        }
        _ => Err(Error::TargetVersionNotFound(format!(
            "neither {} nor helm values of chart {} declare a version",
            constants::CHART_DEFINITION_FILE,
            bundle.metadata.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(values: &str, app_version: Option<&str>) -> ChartBundle {
        ChartBundle {
            metadata: ChartMetadata {
                name: "istio".to_owned(),
                version: "1.0.0".to_owned(),
                app_version: app_version.map(str::to_owned),
            },
            values: serde_yaml::from_str(values).unwrap(),
        }
    }

    #[test]
    fn test_values_override_app_version() {
        let bundle = bundle("global:\n  images:\n    istio_pilot:\n      version: 1.2.3\n", Some("9.9.9"));
        assert_eq!(resolve_target_version(&bundle).unwrap(), "1.2.3");
    }

    #[test]
    fn test_app_version_fallback() {
        let bundle = bundle("global:\n  images:\n    istio_proxyv2:\n      version: 1.2.3\n", Some("1.0.0"));
        assert_eq!(resolve_target_version(&bundle).unwrap(), "1.0.0");
    }

    #[test]
    fn test_empty_values_version_falls_back() {
        let bundle = bundle("global:\n  images:\n    istio_pilot:\n      version: \"\"\n", Some("1.0.0"));
        assert_eq!(resolve_target_version(&bundle).unwrap(), "1.0.0");
    }

    #[test]
    fn test_no_values_file_falls_back() {
        let bundle = bundle("~", Some("1.0.0"));
        assert_eq!(resolve_target_version(&bundle).unwrap(), "1.0.0");
    }

    #[test]
    fn test_neither_source_fails() {
        assert!(matches!(resolve_target_version(&bundle("{}", None)), Err(Error::TargetVersionNotFound(_))));
        assert!(matches!(resolve_target_version(&bundle("{}", Some(""))), Err(Error::TargetVersionNotFound(_))));
    }

    #[test]
    fn test_malformed_values_rejected() {
        let bundle = bundle("global: not-a-map\n", Some("1.0.0"));
        assert!(matches!(resolve_target_version(&bundle), Err(Error::ParserError(_))));
    }

    #[tokio::test]
    async fn test_directory_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Chart.yaml"), "apiVersion: v2\nname: istio\nversion: 1.0.0\nappVersion: 1.11.4\n").unwrap();
        std::fs::write(dir.path().join("values.yaml"), "global:\n  images:\n    istio_pilot:\n      version: 1.12.0\n").unwrap();

        let bundle = DirectoryChartLoader.load(dir.path()).await.unwrap();
        assert_eq!(bundle.metadata.app_version.as_deref(), Some("1.11.4"));
        assert_eq!(resolve_target_version(&bundle).unwrap(), "1.12.0");
    }

    #[tokio::test]
    async fn test_directory_loader_without_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Chart.yaml"), "name: istio\nappVersion: 1.11.4\n").unwrap();

        let bundle = DirectoryChartLoader.load(dir.path()).await.unwrap();
        assert!(bundle.values.is_null());
        assert_eq!(resolve_target_version(&bundle).unwrap(), "1.11.4");
    }

    #[tokio::test]
    async fn test_local_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("main").join("resources")).unwrap();
        let factory = LocalWorkspaceFactory::new(dir.path().to_path_buf());

        let workspace = factory.get("main").await.unwrap();
        assert_eq!(workspace.resource_dir, dir.path().join("main").join("resources"));
        assert!(matches!(factory.get("release-1.0").await, Err(Error::ConfigError(_))));
    }
}
