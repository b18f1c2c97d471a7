#![allow(async_fn_in_trait)]
pub mod catalog;
pub mod config;
pub mod drive;
pub mod error;
pub mod extraction_log;
pub mod geometry;
pub mod imagery;
pub mod pipeline;
pub mod s3;
pub mod session;

#[cfg(test)]
mod mock;
