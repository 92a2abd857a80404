pub mod chart;
pub mod cluster_client;
pub mod commander;
pub mod commander_resolver;
pub mod constants;
pub mod context_data;
pub mod manifest;
pub mod model;
pub mod performer;
pub mod performer_config;
pub mod proxy_reset;
pub mod retry;
pub mod utils;
pub mod version;
pub mod version_output;
pub mod webhook;

#[cfg(test)]
mod test_utils;
