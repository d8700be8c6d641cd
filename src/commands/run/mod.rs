mod environment;
mod execute;
pub(crate) mod output;
mod runner;

pub(crate) use execute::run;
