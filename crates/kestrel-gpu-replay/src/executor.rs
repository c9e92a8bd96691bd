//! Single-threaded GPU executor.
//!
//! One dedicated thread owns all GPU-side mutable state: the guest physical
//! reservation, the swap mode, and the packet executor. Work reaches that
//! state only as queued tasks, which run strictly in submission order and
//! never overlap, so the replay loop needs no locks of its own.

use std::io;
use std::panic;
use std::sync::mpsc;
use std::thread;

use kestrel_guest_phys::GuestPhys;

/// Whether swap side effects are honored or suppressed.
///
/// Replay runs with [`SwapMode::Ignored`] so mid-replay swap traffic does
/// not present intermediate state; the mode returns to
/// [`SwapMode::Normal`] only when a replay range runs to natural
/// exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapMode {
    Normal,
    Ignored,
}

/// Error propagated from the packet executor, e.g. an operation the virtual
/// GPU does not support.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("packet execution failed at {base_address:#x} ({word_count} words): {reason}")]
pub struct PacketError {
    pub base_address: u32,
    pub word_count: u32,
    pub reason: String,
}

/// The packet executor: interprets already-assembled command-buffer words in
/// guest memory into virtual GPU state.
///
/// Implementations run exclusively on the executor thread. Failures should
/// be reported through [`PacketError`]; a panic is caught at the task
/// boundary and fails only the task that raised it, not the executor
/// thread.
pub trait CommandProcessor: Send {
    fn execute_packet(
        &mut self,
        mem: &mut GuestPhys,
        base_address: u32,
        word_count: u32,
    ) -> Result<(), PacketError>;

    fn issue_swap(&mut self, surface_id: u32, width: u32, height: u32);
}

/// The executor thread's mutable state. Tasks receive `&mut GpuContext`;
/// nothing else may touch these fields.
pub struct GpuContext {
    mem: GuestPhys,
    swap_mode: SwapMode,
    processor: Box<dyn CommandProcessor>,
}

impl GpuContext {
    pub fn new(mem: GuestPhys, processor: Box<dyn CommandProcessor>) -> Self {
        Self {
            mem,
            swap_mode: SwapMode::Normal,
            processor,
        }
    }

    pub fn mem(&self) -> &GuestPhys {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut GuestPhys {
        &mut self.mem
    }

    pub fn swap_mode(&self) -> SwapMode {
        self.swap_mode
    }

    pub fn set_swap_mode(&mut self, mode: SwapMode) {
        self.swap_mode = mode;
    }

    pub fn execute_packet(&mut self, base_address: u32, word_count: u32) -> Result<(), PacketError> {
        self.processor
            .execute_packet(&mut self.mem, base_address, word_count)
    }

    /// Present `surface_id` at the given resolution. Suppressed while the
    /// swap mode is [`SwapMode::Ignored`].
    pub fn issue_swap(&mut self, surface_id: u32, width: u32, height: u32) {
        if self.swap_mode == SwapMode::Ignored {
            return;
        }
        self.processor.issue_swap(surface_id, width, height);
    }
}

type Task = Box<dyn FnOnce(&mut GpuContext) + Send + 'static>;

/// Handle to the dedicated executor thread.
///
/// Dropping the handle closes the queue; the thread drains already-queued
/// tasks and is joined. A dispatched task always runs to completion; later
/// submissions queue behind it and never preempt it.
pub struct GpuExecutor {
    tx: Option<mpsc::Sender<Task>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl GpuExecutor {
    pub fn spawn(mem: GuestPhys, processor: Box<dyn CommandProcessor>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Task>();
        let thread = thread::Builder::new()
            .name("kestrel-gpu".into())
            .spawn(move || {
                let mut ctx = GpuContext::new(mem, processor);
                while let Ok(task) = rx.recv() {
                    // A panicking task must not take the thread (and every
                    // queued task behind it) down with it.
                    let unwound =
                        panic::catch_unwind(panic::AssertUnwindSafe(|| task(&mut ctx))).is_err();
                    if unwound {
                        tracing::error!("executor task panicked");
                    }
                }
            })?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Enqueue a task for the executor thread. Never blocks; tasks run in
    /// FIFO submission order. Submissions after shutdown are dropped.
    pub fn submit(&self, task: impl FnOnce(&mut GpuContext) + Send + 'static) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Box::new(task));
        }
    }

    /// Block until every task submitted before this call has finished.
    pub fn flush(&self) {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        self.submit(move |_| {
            let _ = done_tx.send(());
        });
        let _ = done_rx.recv();
    }
}

impl Drop for GpuExecutor {
    fn drop(&mut self) {
        // Closing the channel ends the receive loop after queued tasks run.
        drop(self.tx.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
