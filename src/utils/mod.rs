pub mod logging;
pub mod random;
pub mod text;
