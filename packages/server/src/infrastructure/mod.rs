//! Infrastructure layer: store backends, fan-out backends, the classifier
//! client and the DTOs spoken over HTTP.

pub mod classifier;
pub mod dto;
pub mod publisher;
pub mod repository;
