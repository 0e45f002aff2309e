// Infrastructure layer - External dependencies and adapters
pub mod atomic_file;
pub mod config;
pub mod csv_export;
pub mod http_response;
pub mod logging;
pub mod session_cache;
pub mod settings_store;
pub mod upstream_client;
