use std::sync::{Arc, Condvar, Mutex, PoisonError};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use log::{debug, info};

use crate::actor::actor::{Actor, Flow, MessageSource};

pub(super) type CompletedActors = Arc<(Mutex<Vec<u32>>, Condvar)>;

/// Runs one actor on the current thread and tells the supervisor when it
/// finishes, however it finishes.
pub(super) struct Runner {
    completed_actors: CompletedActors,
    actor_id: u32,
    name: String,
}

impl Runner {
    pub(super) fn new(completed_actors: CompletedActors, actor_id: u32, name: String) -> Self {
        Self {
            completed_actors,
            actor_id,
            name,
        }
    }

    pub(super) fn run_actor<T, U>(&self, receiver: &Receiver<T>, mut actor: U) -> Result<()>
    where
        U: Actor<T>,
    {
        debug!("Running actor {} ({})", self.name, self.actor_id);
        actor
            .startup()
            .with_context(|| format!("Error in {} startup", self.name))?;
        while let Ok(msg) = receiver.recv() {
            let flow = actor
                .handle_message(msg)
                .with_context(|| format!("Error in {} handling message", self.name))?;

            if flow == Flow::Stop {
                return Ok(());
            }
        }

        Ok(())
    }

    pub(super) fn run_message_source<T>(&self, mut message_source: T) -> Result<()>
    where
        T: MessageSource,
    {
        debug!("Running message source {} ({})", self.name, self.actor_id);
        loop {
            let flow = message_source
                .run()
                .with_context(|| format!("Error in {} run", self.name))?;

            if flow == Flow::Stop {
                return Ok(());
            }
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        info!("Actor finished: {} ({})", self.name, self.actor_id);
        let (mutex, cvar) = &*self.completed_actors;
        mutex
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.actor_id);
        cvar.notify_one();
    }
}
