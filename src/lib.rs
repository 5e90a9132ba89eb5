pub mod app;
pub mod cl_mapping;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod fs_util;
pub mod graph;
pub mod homology;
pub mod index;
pub mod matrix;
pub mod output;
pub mod report;
pub mod sheet;
pub mod taxonomy;
pub mod template;
