pub mod budget;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod profile;
pub mod retry;
pub mod stage;
pub mod state;
pub mod status;
pub mod target;

#[cfg(test)]
pub(crate) mod testing;
