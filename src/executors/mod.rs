pub mod command;
pub mod invoker;
pub mod toolchain;
