//! Sequences monitor start-up, service, and shutdown.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::{CommandRegistry, GuestServices};
use crate::guest::{HeapGuestMemory, KernelLoader, RawImageLoader, execution_channel};
use crate::health::{HealthReporter, StructuredHealthReporter};

use super::errors::LaunchError;
use super::execution::ExecutionThread;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::PROCESS_TARGET;

/// Collaborators required to run the monitor process.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) kernel_loader: Arc<dyn KernelLoader>,
    pub(crate) shutdown: S,
}

/// Runs the monitor using the production collaborators.
///
/// Blocks until a termination signal arrives.
pub fn run_monitor() -> Result<(), LaunchError> {
    run_monitor_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        kernel_loader: Arc::new(RawImageLoader),
        shutdown: SystemShutdownSignal,
    })
}

/// Runs the monitor with injected collaborators.
pub(crate) fn run_monitor_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        kernel_loader,
        shutdown,
    } = plan;

    let runtime = bootstrap_with(&loader, reporter)?;
    let memory = HeapGuestMemory::shared(runtime.config().guest_memory_bytes());
    let (signal, gate) = execution_channel();
    let execution = ExecutionThread::spawn(gate, Arc::clone(&memory))?;

    let registry = CommandRegistry::standard(GuestServices {
        memory,
        loader: kernel_loader,
        signal,
    });
    let mut monitor = runtime.into_monitor(registry);
    info!(
        target: PROCESS_TARGET,
        socket = %monitor.socket(),
        "starting monitor runtime"
    );

    monitor.init()?;
    shutdown.wait()?;
    monitor.destroy()?;
    // Dropping the registry releases the last execution signal.
    drop(monitor);

    let released = execution.join()?;
    info!(
        target: PROCESS_TARGET,
        released,
        "shutdown sequence completed"
    );
    Ok(())
}
