use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Sender};
use log::{debug, error, info};

use crate::actor::actor::{Actor, MessageSource};

use super::runner::{CompletedActors, Runner};

/// Starts actors on their own named threads and waits for the first one to
/// finish. Any actor finishing, cleanly or not, ends supervision.
pub(crate) struct Supervisor {
    next_actor_id: u32,
    handles: HashMap<u32, (String, JoinHandle<Result<()>>)>,
    completed_actors: CompletedActors,
}

impl Supervisor {
    pub(crate) fn new() -> Self {
        Self {
            next_actor_id: 0,
            handles: HashMap::new(),
            completed_actors: Arc::new((Mutex::new(Vec::new()), Condvar::new())),
        }
    }

    pub(crate) fn start<T, U>(&mut self, actor: T, name: &str) -> Result<Sender<U>>
    where
        T: Actor<U> + Send + 'static,
        U: Send + 'static,
    {
        let (sender, receiver) = unbounded::<U>();
        let (actor_id, runner) = self.new_runner(name);
        self.spawn(actor_id, name, move || runner.run_actor(&receiver, actor))?;

        Ok(sender)
    }

    pub(crate) fn start_message_source<T>(&mut self, message_source: T, name: &str) -> Result<()>
    where
        T: MessageSource + Send + 'static,
    {
        let (actor_id, runner) = self.new_runner(name);
        self.spawn(actor_id, name, move || {
            runner.run_message_source(message_source)
        })
    }

    fn new_runner(&mut self, name: &str) -> (u32, Runner) {
        let actor_id = self.next_actor_id;
        self.next_actor_id += 1;
        let runner = Runner::new(self.completed_actors.clone(), actor_id, name.to_owned());
        (actor_id, runner)
    }

    fn spawn<F>(&mut self, actor_id: u32, name: &str, body: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let join_handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(body)
            .with_context(|| format!("Failed to start {name} thread"))?;
        self.handles
            .insert(actor_id, (name.to_owned(), join_handle));

        Ok(())
    }

    /// Blocks until an actor finishes and reports how it went.
    pub(crate) fn supervise(&mut self) -> Result<()> {
        let actor_id = self.wait_for_completed_actor();
        debug!("Actor ID completed {actor_id:?}");

        let (name, join_handle) = self
            .handles
            .remove(&actor_id)
            .ok_or(anyhow!("No handle for completed actor {actor_id}"))?;
        match join_handle.join() {
            Ok(Ok(())) => {
                info!("Actor clean shutdown: {name}");
                Ok(())
            }
            Ok(Err(err)) => {
                error!("Error in actor {name}: {err:#}");
                Err(err)
            }
            Err(_) => Err(anyhow!("Actor {name} panicked")),
        }
    }

    fn wait_for_completed_actor(&self) -> u32 {
        let (mutex, cvar) = &*self.completed_actors;
        let mut completed_actors = cvar
            .wait_while(
                mutex.lock().unwrap_or_else(PoisonError::into_inner),
                |completed| completed.is_empty(),
            )
            .unwrap_or_else(PoisonError::into_inner);
        // wait_while only returns once the list is non-empty
        completed_actors.pop().unwrap_or_default()
    }
}
