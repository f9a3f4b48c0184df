// taiga-sync-daemon library: the update service behind taiga-syncd.

pub mod config;
pub mod error;
pub mod git;
pub mod http;
pub mod pipeline;
pub mod publish;
pub mod runtime;
pub mod startup;

#[cfg(test)]
pub(crate) mod test_support;
