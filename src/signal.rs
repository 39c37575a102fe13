/*!
 * Ctrl-C handling for the command line
 *
 * The first interrupt cancels the run: workers finish their current attempt,
 * the pool is closed and the report is still written. A second interrupt
 * exits immediately.
 */

use std::io;
use std::thread;

use tracing::warn;

use crate::core::StopHandle;
use crate::error::EXIT_CANCELLED;

#[cfg(unix)]
type Interrupts = tokio::signal::unix::Signal;

#[cfg(windows)]
type Interrupts = tokio::signal::windows::CtrlC;

#[cfg(unix)]
fn listen() -> io::Result<Interrupts> {
    use tokio::signal::unix::{signal, SignalKind};
    signal(SignalKind::interrupt())
}

#[cfg(windows)]
fn listen() -> io::Result<Interrupts> {
    tokio::signal::windows::ctrl_c()
}

/// Cancel the run behind `handle` when the process is interrupted
///
/// The handler is registered before this returns, so an interrupt that
/// arrives afterwards always reaches the run.
pub fn cancel_on_interrupt(handle: StopHandle) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut interrupts = {
        let _context = runtime.enter();
        listen()?
    };

    thread::Builder::new()
        .name("interrupt-listener".to_string())
        .spawn(move || {
            if runtime.block_on(interrupts.recv()).is_none() {
                return;
            }
            warn!("Interrupted, waiting for workers to finish their current attempt");
            handle.cancel();

            if runtime.block_on(interrupts.recv()).is_some() {
                warn!("Interrupted again, exiting without a report");
                std::process::exit(EXIT_CANCELLED);
            }
        })?;

    Ok(())
}
