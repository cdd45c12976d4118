#[allow(clippy::module_inception)]
pub(crate) mod actor;
pub(crate) mod reminder_actor;
pub(crate) mod tick_actor;
