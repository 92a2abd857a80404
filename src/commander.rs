use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::model::Error;
use crate::version::Version;

/// Drives the Istio control plane for exactly one istioctl release.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Commander: Send + Sync {
    /// Installs Istio from the IstioOperator manifest
    async fn install(&self, manifest: &str, kubeconfig: &str) -> Result<(), Error>;

    /// Upgrades an existing installation to the release of this commander
    async fn upgrade(&self, manifest: &str, kubeconfig: &str) -> Result<(), Error>;

    /// Removes every Istio control plane resource from the cluster
    async fn uninstall(&self, kubeconfig: &str) -> Result<(), Error>;

    /// Returns the raw output of `istioctl version` in JSON format
    async fn version(&self, kubeconfig: &str) -> Result<Vec<u8>, Error>;
}

/// Commander backed by an istioctl binary on the local filesystem
#[derive(Debug, Clone)]
pub struct IstioctlCommander {
    version: Version,
    binary: PathBuf,
}

impl IstioctlCommander {
    pub fn new(version: Version, binary: PathBuf) -> Self {
        IstioctlCommander { version, binary }
    }

    async fn execute<I, S>(&self, args: I, kubeconfig: &str) -> Result<Vec<u8>, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let kubeconfig_file = write_temp_file(kubeconfig)?;
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).arg("--kubeconfig").arg(kubeconfig_file.path());

        debug!(command = ?cmd, version = %self.version, "Executing istioctl");

        let output = cmd.kill_on_drop(true).output().await.map_err(|e| {
            Error::CommandExecution(format!("failed to execute {}: {}", self.binary.display(), e))
        })?;
        if !output.status.success() {
            return Err(Error::CommandExecution(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!("istioctl output: {}", String::from_utf8_lossy(&output.stdout));
        Ok(output.stdout)
    }
}

#[async_trait]
impl Commander for IstioctlCommander {
    async fn install(&self, manifest: &str, kubeconfig: &str) -> Result<(), Error> {
        let manifest_file = write_temp_file(manifest)?;
        let file = manifest_file.path().as_os_str();
        self.execute([OsStr::new("apply"), OsStr::new("-f"), file, OsStr::new("--skip-confirmation")], kubeconfig)
            .await
            .map(|_| ())
    }

    async fn upgrade(&self, manifest: &str, kubeconfig: &str) -> Result<(), Error> {
        let manifest_file = write_temp_file(manifest)?;
        let file = manifest_file.path().as_os_str();
        self.execute([OsStr::new("upgrade"), OsStr::new("-f"), file, OsStr::new("--skip-confirmation")], kubeconfig)
            .await
            .map(|_| ())
    }

    async fn uninstall(&self, kubeconfig: &str) -> Result<(), Error> {
        self.execute(["x", "uninstall", "--purge", "--skip-confirmation"], kubeconfig)
            .await
            .map(|_| ())
    }

    async fn version(&self, kubeconfig: &str) -> Result<Vec<u8>, Error> {
        self.execute(["version", "--output", "json"], kubeconfig).await
    }
}

/// istioctl only reads manifests and kubeconfigs from files, the file lives until the handle is dropped
fn write_temp_file(content: &str) -> Result<NamedTempFile, Error> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}
