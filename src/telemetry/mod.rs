pub mod alerts;

pub use alerts::AlertManager;
