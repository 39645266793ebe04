//! Plugin registry.
//!
//! Holds the built-in plugins plus external command plugins loaded from a
//! descriptor directory, and resolves plugin-config requests
//! (`{id: {plugin, args}}`) into a [`ModuleSelectionPlan`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{RegistryError, Result, ValidatorError};
use crate::plugin::{Args, IdentificationPlugin, Plugin, PluginDescription, ValidationPlugin};
use crate::plugins::{
    BagItIntegrityPlugin, CommandDescriptor, CommandPlugin, FidoPlugin, IntegrityPlugin,
    JhovePlugin,
};
use crate::selection::{validate_identifier, ModuleSelectionPlan, Rejection, SelectedModule};
use crate::tools::{ExternalTool, SystemTool};

/// One entry of a plugin-config request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub plugin: String,
    #[serde(default)]
    pub args: Args,
}

impl PluginConfig {
    pub fn new(plugin: impl Into<String>, args: Args) -> Self {
        Self {
            plugin: plugin.into(),
            args,
        }
    }

    /// Parse `{id: {plugin, args}}`, keeping the request order.
    pub fn parse_map(value: &Value) -> Result<Vec<(String, PluginConfig)>> {
        let object = value.as_object().ok_or_else(|| {
            ValidatorError::InvalidRequest("plugin configuration must be an object".to_string())
        })?;
        object
            .iter()
            .map(|(id, entry)| {
                let config = serde_json::from_value(entry.clone()).map_err(|err| {
                    ValidatorError::InvalidRequest(format!("bad configuration for '{id}': {err}"))
                })?;
                Ok((id.clone(), config))
            })
            .collect()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    validation: BTreeMap<String, Arc<dyn ValidationPlugin>>,
    identification: BTreeMap<String, Arc<dyn IdentificationPlugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("validation", &self.validation.keys().collect::<Vec<_>>())
            .field("identification", &self.identification.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in plugins running the configured binaries, plus descriptors
    /// from `plugins_dir` when set.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let jhove: Arc<dyn ExternalTool> = Arc::new(SystemTool::new(config.jhove_cmd.clone()));
        let fido: Arc<dyn ExternalTool> = Arc::new(SystemTool::new(config.fido_cmd.clone()));
        let mut registry = Self::with_tools(jhove, fido, config.hash_block_size);
        if let Some(dir) = &config.plugins_dir {
            registry.load_dir(dir)?;
        }
        Ok(registry)
    }

    /// Built-in plugins on top of the given JHOVE and fido adapters.
    pub fn with_tools(
        jhove: Arc<dyn ExternalTool>,
        fido: Arc<dyn ExternalTool>,
        block_size: usize,
    ) -> Self {
        let puid = Arc::new(FidoPlugin::puid(Arc::clone(&fido)));
        let mimetype = Arc::new(FidoPlugin::mimetype(fido));

        let mut registry = Self::new();
        registry.insert_validation(Arc::new(IntegrityPlugin::with_block_size(block_size)));
        registry.insert_validation(Arc::new(BagItIntegrityPlugin::with_block_size(block_size)));
        registry.insert_validation(Arc::new(JhovePlugin::with_identification(
            Arc::clone(&jhove),
            Arc::clone(&mimetype),
        )));
        registry.insert_validation(Arc::new(
            JhovePlugin::with_identification(jhove, Arc::clone(&mimetype)).bagit(),
        ));
        registry
            .identification
            .insert(puid.name().to_string(), puid);
        registry
            .identification
            .insert(mimetype.name().to_string(), mimetype);
        registry
    }

    fn insert_validation(&mut self, plugin: Arc<dyn ValidationPlugin>) {
        self.validation.insert(plugin.name().to_string(), plugin);
    }

    fn check_name(&self, name: &str) -> std::result::Result<(), RegistryError> {
        validate_identifier(name)?;
        if self.validation.contains_key(name) || self.identification.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        Ok(())
    }

    pub fn register_validation(
        &mut self,
        plugin: Arc<dyn ValidationPlugin>,
    ) -> std::result::Result<(), RegistryError> {
        self.check_name(plugin.name())?;
        self.insert_validation(plugin);
        Ok(())
    }

    pub fn register_identification(
        &mut self,
        plugin: Arc<dyn IdentificationPlugin>,
    ) -> std::result::Result<(), RegistryError> {
        self.check_name(plugin.name())?;
        self.identification.insert(plugin.name().to_string(), plugin);
        Ok(())
    }

    /// Register one command plugin per `*.json` descriptor in `dir`.
    ///
    /// Descriptors are read in file-name order. A descriptor that cannot be
    /// parsed or whose name is invalid or taken is skipped with a warning.
    /// Returns the number of plugins registered.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let registered = CommandDescriptor::from_file(&path).and_then(|descriptor| {
                self.register_validation(Arc::new(CommandPlugin::new(descriptor)))
            });
            match registered {
                Ok(()) => {
                    debug!(descriptor = %path.display(), "registered command plugin");
                    loaded += 1;
                }
                Err(err) => {
                    warn!(descriptor = %path.display(), error = %err, "skipping plugin descriptor")
                }
            }
        }
        info!(dir = %dir.display(), loaded, "loaded external plugins");
        Ok(loaded)
    }

    pub fn validation(&self, name: &str) -> Option<Arc<dyn ValidationPlugin>> {
        self.validation.get(name).cloned()
    }

    pub fn identification(&self, name: &str) -> Option<Arc<dyn IdentificationPlugin>> {
        self.identification.get(name).cloned()
    }

    pub fn validation_names(&self) -> impl Iterator<Item = &str> {
        self.validation.keys().map(String::as_str)
    }

    /// Self-descriptions of every plugin, validation plugins first.
    pub fn describe(&self) -> Vec<PluginDescription> {
        self.validation
            .values()
            .map(|p| p.describe())
            .chain(self.identification.values().map(|p| p.describe()))
            .collect()
    }

    /// Resolve a plugin-config request into a plan.
    pub fn plan(&self, plugins: &[(String, PluginConfig)]) -> ModuleSelectionPlan {
        let mut plan = ModuleSelectionPlan::default();
        for (id, config) in plugins {
            let name = &config.plugin;
            let Some(plugin) = self.validation(name) else {
                plan.rejections.push(Rejection::new(
                    id.as_str(),
                    format!("Unknown or unavailable plugin '{name}'."),
                ));
                continue;
            };
            if let Err(reason) = plugin.requirements_met() {
                plan.rejections.push(Rejection::new(
                    id.as_str(),
                    format!("Plugin '{name}' unavailable: {reason}"),
                ));
                continue;
            }
            if let Err(err) = plugin.signature().validate(&config.args) {
                plan.rejections.push(Rejection::new(
                    id.as_str(),
                    format!("Bad arguments for plugin '{name}': {err}"),
                ));
                continue;
            }
            plan.modules.push(SelectedModule {
                id: id.clone(),
                plugin,
                args: config.args.clone(),
            });
        }
        for rejection in &plan.rejections {
            crate::obs::emit_module_rejected(&rejection.module, &rejection.reason);
        }
        plan
    }
}
