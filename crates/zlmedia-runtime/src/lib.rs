#[cfg(not(unix))]
compile_error!("zlmedia-runtime only supports unix platforms");

mod factory;
mod runtime;

pub use factory::PlatformProcessManagerFactory;
pub use runtime::ZlMediaRuntime;

// Re-export core functionality
pub use zlmedia_runtime_core::*;
