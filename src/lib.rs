pub mod cloud;
pub mod config;
pub mod extract;
pub mod runner;
pub mod sink;
pub mod webquery;

#[cfg(test)]
mod testutil;
