pub mod catalog;
pub mod run;
pub mod session;
pub mod utils;

#[cfg(test)]
#[path = "../commands_test.rs"]
mod commands_test;
