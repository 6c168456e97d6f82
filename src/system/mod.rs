pub mod detect;

pub use detect::detect_capabilities;
