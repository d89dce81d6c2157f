#![forbid(unsafe_code)]

pub mod forwarding_service;
pub mod reconciler;
pub mod twamp_responder;
pub mod twamp_sender;
