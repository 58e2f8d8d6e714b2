use zlmedia_runtime_core::ProcessManagerFactory;

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformProcessManagerFactory;

impl ProcessManagerFactory for PlatformProcessManagerFactory {
    type Manager = zlmedia_runtime_unix::UnixProcessManager;

    fn create_process_manager() -> Self::Manager {
        zlmedia_runtime_unix::UnixProcessManagerFactory::create_process_manager()
    }

    fn platform_name() -> &'static str {
        zlmedia_runtime_unix::UnixProcessManagerFactory::platform_name()
    }
}
