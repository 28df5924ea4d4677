pub mod control;
pub mod events;
pub mod settings;
pub mod status;
pub mod words;
