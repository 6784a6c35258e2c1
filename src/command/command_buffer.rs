use super::Command;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Thread-safe FIFO of commands shared between the control loop and the
/// I/O tasks (command feed, response reporter).
///
/// Consumers never drain element by element, they [`swap`](Self::swap) the
/// whole queue out so producers only ever hold the lock for a push.
#[derive(Debug, Default)]
pub(crate) struct LockedCommandBuffer {
    queue: Mutex<VecDeque<Command>>,
}

impl LockedCommandBuffer {
    pub fn new() -> Self { Self { queue: Mutex::new(VecDeque::new()) } }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Command>> {
        self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Pushes a command onto the back of the queue.
    pub fn push(&self, command: Command) { self.lock_queue().push_back(command); }

    /// Pushes several commands while holding the lock once.
    pub fn extend<I: IntoIterator<Item = Command>>(&self, commands: I) {
        self.lock_queue().extend(commands);
    }

    /// Takes every queued command, leaving an empty queue behind.
    pub fn swap(&self) -> Vec<Command> { std::mem::take(&mut *self.lock_queue()).into() }

    pub fn len(&self) -> usize { self.lock_queue().len() }

    pub fn is_empty(&self) -> bool { self.lock_queue().is_empty() }
}
