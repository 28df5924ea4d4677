pub mod config;
pub mod control;
pub mod init;
pub mod run;
pub mod state;
pub mod words;
