pub mod engine;
pub mod paths;
pub mod reconcile;
