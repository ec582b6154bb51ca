//! Chibi - event-driven automation engine
//!
//! Connects to AMQP event stores, subscribes to queues and exchanges, and on
//! every inbound message runs a configured pipeline of guarded actions
//! (process execution or republishing to another event store). A startup and
//! shutdown hook pipeline runs independently of inbound messages.

pub mod action;
pub mod condition;
pub mod config;
pub mod event_store;
pub mod hook;
pub mod pipeline;
pub mod subscriber;
pub mod utils;
pub mod vars;
