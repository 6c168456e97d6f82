pub mod layout;

pub use layout::RunLayout;
