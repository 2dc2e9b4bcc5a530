//! Configuration editing helpers.
//!
//! Append/lookup operations that preserve the one-command-list-per-key
//! invariant: a `ControllerConfig` never holds two command lists for
//! the same `(api_version, module_type)`.

use crate::domain::{Command, CommandList, ControllerConfig, ModuleType};

impl ControllerConfig {
    /// The command list for the given API version and module type.
    ///
    /// Linear search — command-list counts are bounded to fit a `u8`.
    pub fn get_command_list(
        &self,
        api_version: u8,
        module_type: ModuleType,
    ) -> Option<&CommandList> {
        self.command_lists
            .iter()
            .find(|cl| cl.api_version == api_version && cl.module_type == module_type)
    }

    /// Append a command to the list for the given key, creating the
    /// list if no command list exists for that key yet.
    pub fn add_command(&mut self, api_version: u8, module_type: ModuleType, command: Command) {
        if let Some(cl) = self
            .command_lists
            .iter_mut()
            .find(|cl| cl.api_version == api_version && cl.module_type == module_type)
        {
            cl.commands.push(command);
            return;
        }
        self.command_lists.push(CommandList {
            api_version,
            module_type,
            commands: vec![command],
        });
    }
}
