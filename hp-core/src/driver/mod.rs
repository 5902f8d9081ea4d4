//! Driver-side types: names, descriptors and ready-made controllers

pub mod descriptor;
pub mod flag;
pub mod name;
pub mod sysfs;

pub use descriptor::{Controller, ControllerDescriptor, DescriptorRef};
pub use flag::FlagController;
pub use name::{names_match, truncate_bounded, DriverName};
pub use sysfs::SysfsController;

#[cfg(test)]
pub use descriptor::MockController;
