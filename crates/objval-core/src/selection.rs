//! Module selection.
//!
//! Resolves a client's requested module list into argument-bound plugins
//! plus rejections. Module identifiers carrying [`SUB_PLUGIN_PREFIX`] are
//! format-validation sub-plugins: they are never run on their own but
//! wrapped into one [`FileFormatModule`] under the [`GENERIC_FORMAT_MODULE`]
//! slot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{RegistryError, Result, ValidatorError};
use crate::obs;
use crate::plugin::{Args, IdentificationPlugin, Plugin, ValidationPlugin};
use crate::plugins::{FidoPlugin, FileFormatModule, JhovePlugin, SubPlugin, ANY_FORMAT};
use crate::registry::PluginRegistry;

/// Prefix marking format-validation sub-plugins.
pub const SUB_PLUGIN_PREFIX: &str = "file_format_";

/// The generic format-validation module.
pub const GENERIC_FORMAT_MODULE: &str = "file_format";

/// Builds an argument-bound plugin for one module identifier.
pub type ModuleFactory =
    Box<dyn Fn(&Args) -> Result<Arc<dyn ValidationPlugin>> + Send + Sync>;

/// Where a validation target comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationContext {
    /// A single file.
    Object,
    /// A BagIt information package.
    Ip,
}

impl ValidationContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Ip => "ip",
        }
    }

    /// Modules a client may request in this context.
    pub fn allowed(&self) -> &'static [&'static str] {
        match self {
            Self::Object => &["file_integrity", "file_format", "file_format_jhove"],
            Self::Ip => &["payload_integrity", "file_format", "file_format_jhove"],
        }
    }

    pub fn is_allowed(&self, module: &str) -> bool {
        self.allowed().contains(&module)
    }

    /// Arguments bound to every module before the client's own.
    pub fn default_args(&self) -> Args {
        let mut args = Args::new();
        args.insert("batch".to_string(), json!(matches!(self, Self::Ip)));
        args
    }

    /// Whether format validation only covers the payload `data/` directory.
    pub fn payload_only(&self) -> bool {
        matches!(self, Self::Ip)
    }
}

impl fmt::Display for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationContext {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "object" => Ok(Self::Object),
            "ip" => Ok(Self::Ip),
            other => Err(ValidatorError::InvalidRequest(format!(
                "unknown validation context '{other}'"
            ))),
        }
    }
}

/// A module that could not be selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub module: String,
    pub reason: String,
}

impl Rejection {
    pub fn new(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            reason: reason.into(),
        }
    }
}

/// A plugin ready to run, with its bound arguments.
#[derive(Clone)]
pub struct SelectedModule {
    pub id: String,
    pub plugin: Arc<dyn ValidationPlugin>,
    pub args: Args,
}

impl fmt::Debug for SelectedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedModule")
            .field("id", &self.id)
            .field("plugin", &self.plugin.name())
            .field("args", &self.args)
            .finish()
    }
}

/// Outcome of a selection: both parts are always present, possibly empty.
#[derive(Debug, Clone, Default)]
pub struct ModuleSelectionPlan {
    pub modules: Vec<SelectedModule>,
    pub rejections: Vec<Rejection>,
}

impl ModuleSelectionPlan {
    pub fn module_ids(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn module(&self, id: &str) -> Option<&SelectedModule> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn is_rejected(&self, id: &str) -> bool {
        self.rejections.iter().any(|r| r.module == id)
    }

    fn reject(&mut self, module: &str, reason: String) {
        obs::emit_module_rejected(module, &reason);
        self.rejections.push(Rejection::new(module, reason));
    }
}

/// Check an identifier against `[a-z0-9][a-z0-9_-]*`.
pub fn validate_identifier(id: &str) -> std::result::Result<(), RegistryError> {
    let mut chars = id.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let tail_ok =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if head_ok && tail_ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidIdentifier(id.to_string()))
    }
}

struct SubPluginEntry {
    associations: Vec<String>,
    factory: ModuleFactory,
}

/// Known modules and format sub-plugins, each with a factory.
pub struct ModuleCatalog {
    identification: Arc<dyn IdentificationPlugin>,
    modules: BTreeMap<String, ModuleFactory>,
    sub_plugins: BTreeMap<String, SubPluginEntry>,
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("identification", &self.identification.name())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("sub_plugins", &self.sub_plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Factory handing out a shared plugin after checking the bound arguments
/// against its signature.
pub fn shared_factory(plugin: Arc<dyn ValidationPlugin>) -> ModuleFactory {
    Box::new(move |args: &Args| -> Result<Arc<dyn ValidationPlugin>> {
        plugin.signature().validate(args)?;
        Ok(Arc::clone(&plugin))
    })
}

impl ModuleCatalog {
    pub fn new(identification: Arc<dyn IdentificationPlugin>) -> Self {
        Self {
            identification,
            modules: BTreeMap::new(),
            sub_plugins: BTreeMap::new(),
        }
    }

    /// The standard catalog backed by the plugins of `registry`:
    /// `file_integrity`, `payload_integrity` and the JHOVE sub-plugin
    /// `file_format_jhove` accepting any format.
    pub fn standard(registry: &PluginRegistry) -> Result<Self> {
        let identification = registry.identification(FidoPlugin::MIMETYPE).ok_or_else(|| {
            ValidatorError::Config(format!(
                "identification plugin '{}' is not registered",
                FidoPlugin::MIMETYPE
            ))
        })?;
        let required = |name: &str| {
            registry.validation(name).ok_or_else(|| {
                ValidatorError::Config(format!("validation plugin '{name}' is not registered"))
            })
        };

        let mut catalog = Self::new(identification);
        catalog.register_module("file_integrity", shared_factory(required("integrity")?))?;
        catalog.register_module(
            "payload_integrity",
            shared_factory(required("integrity-bagit")?),
        )?;
        catalog.register_sub_plugin(
            "file_format_jhove",
            &[ANY_FORMAT],
            shared_factory(required(JhovePlugin::NAME)?),
        )?;
        Ok(catalog)
    }

    pub fn register_module(
        &mut self,
        id: &str,
        factory: ModuleFactory,
    ) -> std::result::Result<(), RegistryError> {
        validate_identifier(id)?;
        if id == GENERIC_FORMAT_MODULE || id.starts_with(SUB_PLUGIN_PREFIX) {
            return Err(RegistryError::InvalidIdentifier(id.to_string()));
        }
        if self.modules.contains_key(id) {
            return Err(RegistryError::Duplicate(id.to_string()));
        }
        self.modules.insert(id.to_string(), factory);
        Ok(())
    }

    pub fn register_sub_plugin(
        &mut self,
        id: &str,
        associations: &[&str],
        factory: ModuleFactory,
    ) -> std::result::Result<(), RegistryError> {
        validate_identifier(id)?;
        if !id.starts_with(SUB_PLUGIN_PREFIX) {
            return Err(RegistryError::InvalidIdentifier(id.to_string()));
        }
        if self.sub_plugins.contains_key(id) {
            return Err(RegistryError::Duplicate(id.to_string()));
        }
        self.sub_plugins.insert(
            id.to_string(),
            SubPluginEntry {
                associations: associations.iter().map(|a| a.to_string()).collect(),
                factory,
            },
        );
        Ok(())
    }

    pub fn is_known(&self, id: &str) -> bool {
        id == GENERIC_FORMAT_MODULE
            || self.modules.contains_key(id)
            || self.sub_plugins.contains_key(id)
    }

    pub fn sub_plugin_ids(&self) -> impl Iterator<Item = &str> {
        self.sub_plugins.keys().map(String::as_str)
    }

    /// Resolve `requested` (or the whole allow-list for `None`) into a plan.
    ///
    /// Module arguments are the context defaults overridden by
    /// `kwargs[id]`. Sub-plugins are only ever run inside the composite
    /// format module, which is placed at the position of the first
    /// format-related request.
    pub fn select(
        &self,
        context: ValidationContext,
        requested: Option<&[String]>,
        kwargs: &BTreeMap<String, Args>,
    ) -> ModuleSelectionPlan {
        let requested: Vec<String> = match requested {
            Some(list) => {
                let mut seen = BTreeSet::new();
                list.iter()
                    .filter(|id| seen.insert(id.as_str()))
                    .cloned()
                    .collect()
            }
            None => context.allowed().iter().map(|id| id.to_string()).collect(),
        };
        debug!(context = %context, requested = ?requested, "selecting modules");

        let mut plan = ModuleSelectionPlan::default();
        let mut deferred = Vec::new();
        let mut generic = false;
        let mut format_slot = None;

        for id in &requested {
            if !context.is_allowed(id) {
                plan.reject(id, format!("Module '{id}' is not allowed in this context."));
                continue;
            }
            if !self.is_known(id) {
                plan.reject(id, format!("Unknown or unavailable module '{id}'."));
                continue;
            }
            if id == GENERIC_FORMAT_MODULE {
                generic = true;
            } else if id.starts_with(SUB_PLUGIN_PREFIX) {
                deferred.push(id.as_str());
            } else {
                self.bind_direct(context, id, kwargs, &mut plan);
                continue;
            }
            // composite goes where the first format request sits among built modules
            format_slot.get_or_insert(plan.modules.len());
        }

        if generic && deferred.is_empty() {
            deferred = self.sub_plugin_ids().collect();
        }

        if !deferred.is_empty() && context.is_allowed(GENERIC_FORMAT_MODULE) {
            if let Some(module) = self.composite(context, &deferred, kwargs, &mut plan) {
                let slot = format_slot.unwrap_or(plan.modules.len()).min(plan.modules.len());
                plan.modules.insert(slot, module);
            }
        }
        plan
    }

    fn bind_direct(
        &self,
        context: ValidationContext,
        id: &str,
        kwargs: &BTreeMap<String, Args>,
        plan: &mut ModuleSelectionPlan,
    ) {
        let args = bind_args(context, kwargs.get(id));
        match self.modules.get(id).map(|factory| factory(&args)) {
            Some(Ok(plugin)) => plan.modules.push(SelectedModule {
                id: id.to_string(),
                plugin,
                args,
            }),
            Some(Err(err)) => plan.reject(id, constructor_failure(id, &err)),
            None => plan.reject(id, format!("Unknown or unavailable module '{id}'.")),
        }
    }

    fn composite(
        &self,
        context: ValidationContext,
        deferred: &[&str],
        kwargs: &BTreeMap<String, Args>,
        plan: &mut ModuleSelectionPlan,
    ) -> Option<SelectedModule> {
        let mut sub_plugins = Vec::new();
        for id in deferred {
            let Some(entry) = self.sub_plugins.get(*id) else {
                continue;
            };
            let args = kwargs.get(*id).cloned().unwrap_or_default();
            match (entry.factory)(&args) {
                Ok(plugin) => sub_plugins.push(SubPlugin {
                    id: id.to_string(),
                    plugin,
                    associations: entry.associations.clone(),
                    args,
                }),
                Err(err) => plan.reject(id, constructor_failure(id, &err)),
            }
        }
        if sub_plugins.is_empty() {
            return None;
        }

        let module = FileFormatModule::new(Arc::clone(&self.identification), sub_plugins)
            .payload_only(context.payload_only());
        let args = bind_args(context, kwargs.get(GENERIC_FORMAT_MODULE));
        if let Err(err) = module.signature().validate(&args) {
            let err = ValidatorError::from(err);
            plan.reject(GENERIC_FORMAT_MODULE, constructor_failure(GENERIC_FORMAT_MODULE, &err));
            return None;
        }
        Some(SelectedModule {
            id: GENERIC_FORMAT_MODULE.to_string(),
            plugin: Arc::new(module),
            args,
        })
    }
}

fn bind_args(context: ValidationContext, kwargs: Option<&Args>) -> Args {
    let mut args = context.default_args();
    if let Some(kwargs) = kwargs {
        args.extend(kwargs.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    args
}

fn constructor_failure(id: &str, err: &ValidatorError) -> String {
    format!("Cannot initialize module '{id}' ({}): {err}", err.kind())
}
