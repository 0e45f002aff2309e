// Application layer - Session state, pipelines and collaborator traits
pub mod auto_refresh;
pub mod controller;
pub mod session;
pub mod sources;
pub mod tree_view;
