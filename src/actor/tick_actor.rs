use std::{
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;
use log::debug;

use super::actor::{Flow, MessageSource};

pub(crate) struct TickActor<T> {
    duration: Duration,
    tx: Sender<T>,
    message_builder: fn(Instant) -> T,
}

impl<T> TickActor<T> {
    pub(crate) fn new(duration: Duration, tx: Sender<T>, message_builder: fn(Instant) -> T) -> Self {
        Self {
            duration,
            tx,
            message_builder,
        }
    }
}

impl<T> MessageSource for TickActor<T>
where
    T: Send + 'static,
{
    fn run(&mut self) -> anyhow::Result<Flow> {
        thread::sleep(self.duration);
        if self.tx.send((self.message_builder)(Instant::now())).is_err() {
            debug!("Tick receiver has gone away, stopping");
            return Ok(Flow::Stop);
        }

        Ok(Flow::Continue)
    }
}
