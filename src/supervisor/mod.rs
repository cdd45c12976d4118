mod runner;
#[allow(clippy::module_inception)]
pub(crate) mod supervisor;
