pub mod cluster_report;
pub mod config;
pub mod device;
pub mod pipeline;
pub mod save_results;
pub mod scale_common;
pub mod scale_input;
pub mod scale_model;
