use anyhow::Result;

/// Implemented by whatever the host OS uses to register/start/stop a
/// long-running service. `gpii-windows` is the only implementor today;
/// the trait lives here so `gpii-bin`'s install/uninstall flow never
/// names a concrete OS type.
pub trait ServiceManager: Send + Sync {
    /// Register the service with the OS's service manager.
    fn install(&self) -> Result<()>;

    /// Remove the service registration, stopping it first if running.
    fn uninstall(&self) -> Result<()>;

    /// Start the service.
    fn start(&self) -> Result<()>;

    /// Stop the service.
    fn stop(&self) -> Result<()>;

    /// Check if the service is currently running.
    fn is_running(&self) -> Result<bool>;
}
