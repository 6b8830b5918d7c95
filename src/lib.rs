pub mod blob;
pub mod config;
pub mod discover;
pub mod docstore;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod load;
pub mod output;
pub mod panel;
pub mod pipeline;
pub mod report;
pub mod sample;
