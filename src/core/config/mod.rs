pub mod data;
pub mod io;

pub use data::{path_display, Config, ProviderConfig, QuoteSettings};
pub use io::ConfigError;

#[cfg(test)]
mod tests;
