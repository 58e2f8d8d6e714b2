mod unix_process_manager;

pub use unix_process_manager::{UnixProcessHandle, UnixProcessManager};

use zlmedia_runtime_core::{ProcessManager, ProcessManagerFactory};

pub struct UnixProcessManagerFactory;

impl ProcessManagerFactory for UnixProcessManagerFactory {
    type Manager = UnixProcessManager;

    fn create_process_manager() -> Self::Manager {
        UnixProcessManager::new()
    }

    fn platform_name() -> &'static str {
        "unix"
    }
}
