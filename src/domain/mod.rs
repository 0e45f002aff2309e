// Domain layer - Pure data model and projection algorithms
pub mod coverage;
pub mod expansion;
pub mod forward_fill;
pub mod grouping;
pub mod header;
pub mod selection;
pub mod settings;
pub mod table;
pub mod tag;
pub mod telemetry;
