pub mod observer;
pub mod printer;
pub mod progress;
