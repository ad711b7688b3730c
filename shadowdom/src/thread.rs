//! The single thread that owns a document's provider and snapshot.
//!
//! Work is posted as closures over the thread's state. Callers on other
//! threads may block until their closure has run; the document thread itself
//! may only post.

use crate::{DocumentError, debug, error};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle, ThreadId};

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;
type Teardown<S> = Box<dyn FnOnce(S) + Send>;
type Panic = Box<dyn Any + Send>;

enum Command<S> {
    Run(Task<S>),
    Shutdown(Teardown<S>),
}

/// A cloneable way to reach a [`DocumentThread`].
pub struct ThreadHandle<S> {
    sender: Sender<Command<S>>,
    thread_id: ThreadId,
}

impl<S> Clone for ThreadHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            thread_id: self.thread_id,
        }
    }
}

impl<S: 'static> ThreadHandle<S> {
    /// Whether the caller is running on the document thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue `task` and return immediately. Returns `false` if the thread is gone.
    pub fn post(&self, task: impl FnOnce(&mut S) + Send + 'static) -> bool {
        self.sender.send(Command::Run(Box::new(task))).is_ok()
    }

    /// Run `task` on the document thread and wait for its result.
    ///
    /// A panic inside `task` is re-raised on the caller.
    ///
    /// Called on the document thread itself this returns
    /// [`DocumentError::Reentrant`]. The caller is then inside some other task
    /// that holds the only `&mut S`, so `task` can neither run inline nor
    /// wait behind it. Code on the document thread works with what its task
    /// was handed (for listeners, the [`DocumentContext`](crate::DocumentContext)
    /// of the event) or uses [`Self::post`].
    pub fn post_and_wait<R>(
        &self,
        task: impl FnOnce(&mut S) -> R + Send + 'static,
    ) -> Result<R, DocumentError>
    where
        R: Send + 'static,
    {
        if self.is_current() {
            return Err(DocumentError::Reentrant);
        }

        let (reply, result) = mpsc::sync_channel::<Result<R, Panic>>(1);
        let wrapped = move |state: &mut S| {
            let outcome = catch_unwind(AssertUnwindSafe(|| task(state)));
            let _ = reply.send(outcome);
        };
        if !self.post(wrapped) {
            return Err(DocumentError::ThreadTerminated);
        }

        match result.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => resume_unwind(payload),
            Err(_) => Err(DocumentError::ThreadTerminated),
        }
    }
}

/// Owner of the document thread. Dropping it asks the thread to stop without
/// waiting for it.
pub struct DocumentThread<S: 'static> {
    handle: ThreadHandle<S>,
    join: Option<JoinHandle<()>>,
}

impl<S: 'static> DocumentThread<S> {
    /// Start a thread named `name` whose state is built by `init`, on the
    /// thread itself.
    ///
    /// Returns once `init` has finished. If it fails, the thread exits and the
    /// error is returned here; if it panics, the panic is re-raised here.
    pub fn spawn(
        name: &str,
        stack_size: Option<usize>,
        init: impl FnOnce(&ThreadHandle<S>) -> Result<S, DocumentError> + Send + 'static,
    ) -> Result<Self, DocumentError> {
        let (sender, receiver) = mpsc::channel::<Command<S>>();
        let (ready, started) = mpsc::sync_channel::<Result<Result<(), DocumentError>, Panic>>(1);

        let mut builder = thread::Builder::new().name(name.to_owned());
        if let Some(stack_size) = stack_size {
            builder = builder.stack_size(stack_size);
        }

        let own_sender = sender.clone();
        let join = builder
            .spawn(move || {
                let handle = ThreadHandle {
                    sender: own_sender,
                    thread_id: thread::current().id(),
                };
                let state = match catch_unwind(AssertUnwindSafe(|| init(&handle))) {
                    Ok(Ok(state)) => state,
                    Ok(Err(err)) => {
                        let _ = ready.send(Ok(Err(err)));
                        return;
                    }
                    Err(payload) => {
                        let _ = ready.send(Err(payload));
                        return;
                    }
                };
                drop(handle);
                let _ = ready.send(Ok(Ok(())));
                run(state, receiver);
            })
            .map_err(|_e| {
                error!(error = %_e, "could not spawn document thread");
                DocumentError::SpawnFailed
            })?;

        let thread_id = join.thread().id();
        match started.recv() {
            Ok(Ok(Ok(()))) => {
                debug!(name, "document thread started");
                Ok(Self {
                    handle: ThreadHandle { sender, thread_id },
                    join: Some(join),
                })
            }
            Ok(Ok(Err(err))) => {
                let _ = join.join();
                Err(err)
            }
            Ok(Err(payload)) => {
                let _ = join.join();
                resume_unwind(payload)
            }
            Err(_) => {
                let _ = join.join();
                Err(DocumentError::ThreadTerminated)
            }
        }
    }

    pub fn handle(&self) -> &ThreadHandle<S> {
        &self.handle
    }

    /// Hand the state to `teardown` on the document thread and stop.
    ///
    /// From another thread this waits for the thread to exit. From the
    /// document thread itself it only queues the shutdown behind the task
    /// that is currently running.
    pub fn shutdown(mut self, teardown: impl FnOnce(S) + Send + 'static) {
        let sent = self
            .handle
            .sender
            .send(Command::Shutdown(Box::new(teardown)))
            .is_ok();
        let Some(join) = self.join.take() else {
            return;
        };
        if !sent || self.handle.is_current() {
            return;
        }
        if join.join().is_err() {
            error!("document thread panicked during shutdown");
        }
    }
}

impl<S: 'static> Drop for DocumentThread<S> {
    fn drop(&mut self) {
        if self.join.take().is_some() {
            debug!("document thread dropped without shutdown, stopping it");
            let _ = self.handle.sender.send(Command::Shutdown(Box::new(drop)));
        }
    }
}

fn run<S>(mut state: S, receiver: Receiver<Command<S>>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Run(task) => {
                if catch_unwind(AssertUnwindSafe(|| task(&mut state))).is_err() {
                    error!("document task panicked");
                }
            }
            Command::Shutdown(teardown) => {
                if catch_unwind(AssertUnwindSafe(|| teardown(state))).is_err() {
                    error!("document teardown panicked");
                }
                debug!("document thread stopped");
                return;
            }
        }
    }
    debug!("document thread queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_thread() -> DocumentThread<Vec<u32>> {
        DocumentThread::spawn("test-document", None, |_| Ok(Vec::new())).expect("spawn")
    }

    #[test]
    fn test_post_and_wait_runs_in_order() {
        let thread = counter_thread();
        let handle = thread.handle().clone();
        assert!(!handle.is_current());

        for i in 0..10 {
            assert!(handle.post(move |state| state.push(i)));
        }
        let seen = handle.post_and_wait(|state| state.clone()).expect("wait");
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        thread.shutdown(drop);
    }

    #[test]
    fn test_waiting_from_the_document_thread_is_refused() {
        let thread = counter_thread();
        let handle = thread.handle().clone();
        let inner = handle.clone();
        let result = handle
            .post_and_wait(move |_| inner.post_and_wait(|_| ()))
            .expect("outer wait");
        assert_eq!(result, Err(DocumentError::Reentrant));
        thread.shutdown(drop);
    }

    #[test]
    fn test_panics_reach_the_waiting_caller() {
        let thread = counter_thread();
        let handle = thread.handle().clone();
        let caught = catch_unwind(AssertUnwindSafe(|| {
            let _ = handle.post_and_wait(|_| -> u32 { panic!("boom") });
        }));
        assert!(caught.is_err());

        // The thread survives and keeps serving.
        assert_eq!(handle.post_and_wait(|state| state.len()), Ok(0));
        thread.shutdown(drop);
    }

    #[test]
    fn test_shutdown_runs_teardown_and_joins() {
        let torn_down = Arc::new(AtomicUsize::new(0));
        let thread = counter_thread();
        let handle = thread.handle().clone();
        handle.post(|state| state.push(42));

        let observed = torn_down.clone();
        thread.shutdown(move |state| observed.store(state.len(), Ordering::SeqCst));
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
        assert_eq!(
            handle.post_and_wait(|state| state.len()),
            Err(DocumentError::ThreadTerminated)
        );
    }

    #[test]
    fn test_init_failure_is_returned() {
        let result =
            DocumentThread::<Vec<u32>>::spawn("test-document", None, |_| Err(DocumentError::NoRootElement));
        assert!(matches!(result, Err(DocumentError::NoRootElement)));
    }
}
