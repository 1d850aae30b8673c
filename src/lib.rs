pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod plan;
pub mod report;
pub mod search;
pub mod transfer;
