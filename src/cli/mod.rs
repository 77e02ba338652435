pub mod assets;
pub mod clear_store;
pub mod quote;
pub mod setup;
pub mod ui;
