use anyhow::Result;

/// Whether a runner should keep going after a message.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

pub(crate) trait Actor<T> {
    fn startup(&mut self) -> Result<()>;
    fn handle_message(&mut self, msg: T) -> Result<Flow>;
}

/// Feeds other actors instead of receiving messages itself.
pub(crate) trait MessageSource {
    fn run(&mut self) -> Result<Flow>;
}
