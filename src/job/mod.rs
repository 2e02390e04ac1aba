//! Жизненный цикл задач генерации: синхронный и асинхронный режимы

pub mod controller;
pub mod state;

#[cfg(test)]
mod tests;

pub use controller::{JobController, DEFAULT_POLL_INTERVAL};
pub use state::JobControllerState;
