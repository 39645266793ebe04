//! Concrete plugins.

pub mod bagit;
pub mod command;
pub mod file_format;
pub mod identification;
pub mod integrity;
pub mod jhove;

pub use bagit::BagItIntegrityPlugin;
pub use command::{CommandDescriptor, CommandPlugin};
pub use file_format::{FileFormatModule, SubPlugin, ANY_FORMAT};
pub use identification::FidoPlugin;
pub use integrity::IntegrityPlugin;
pub use jhove::{default_module_map, JhovePlugin, ModuleTypeMap, AUTO_MODULE};
