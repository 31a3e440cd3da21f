// src/lib.rs

pub mod backend;
pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod model;
pub mod notify;
pub mod packagekit;
pub mod pk_enum;
pub mod reconciler;
pub mod repo_window;
pub mod session;
