mod log;
mod node;
mod run;
mod workflow;
