use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::commander::{Commander, IstioctlCommander};
use crate::model::Error;
use crate::performer_config::IstioctlBinary;
use crate::version::Version;

/// Builds a commander bound to the version it was registered for
pub type CommanderFactory = Arc<dyn Fn() -> Box<dyn Commander> + Send + Sync>;

/// Provides the commander able to drive a given istioctl version
#[cfg_attr(test, automock)]
pub trait CommanderResolver: Send + Sync {
    /// Returns a commander for the version if supported, an `UnsupportedVersion` error otherwise
    fn get_commander(&self, version: &Version) -> Result<Box<dyn Commander>, Error>;
}

/// Strategy table populated at startup and keyed by version.
///
/// An exact match wins. Otherwise the highest registered version of the same `major.minor`
/// line is used, since istioctl patch releases of one line drive the same control plane.
#[derive(Default, Clone)]
pub struct StaticCommanderResolver {
    registry: BTreeMap<Version, CommanderFactory>,
}

impl StaticCommanderResolver {
    pub fn new() -> Self {
        StaticCommanderResolver::default()
    }

    /// Registers one istioctl binary per configured version
    pub fn from_binaries(binaries: &[IstioctlBinary]) -> Result<Self, Error> {
        let mut resolver = StaticCommanderResolver::new();
        for binary in binaries {
            let version = Version::parse(&binary.version)?;
            if resolver.registry.contains_key(&version) {
                return Err(Error::ConfigError(format!("istioctl version {version} is configured more than once")));
            }
            let commander = IstioctlCommander::new(version.clone(), binary.path.clone());
            resolver.register(version, Arc::new(move || Box::new(commander.clone()) as Box<dyn Commander>));
        }
        Ok(resolver)
    }

    pub fn register(&mut self, version: Version, factory: CommanderFactory) {
        self.registry.insert(version, factory);
    }

    pub fn supported_versions(&self) -> Vec<&Version> {
        self.registry.keys().collect()
    }
}

impl CommanderResolver for StaticCommanderResolver {
    fn get_commander(&self, version: &Version) -> Result<Box<dyn Commander>, Error> {
        if let Some(factory) = self.registry.get(version) {
            return Ok(factory());
        }
        match self.registry.iter().rev().find(|(registered, _)| registered.same_release_line(version)) {
            Some((registered, factory)) => {
                debug!("Using istioctl {registered} for requested version {version}");
                Ok(factory())
            }
            None => Err(Error::UnsupportedVersion(version.to_string())),
        }
    }
}
