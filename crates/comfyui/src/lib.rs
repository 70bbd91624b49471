//! ComfyUI WebSocket and REST client library.
//!
//! Provides the REST wrapper used to submit, inspect, dequeue and
//! interrupt prompts, typed WebSocket message parsing, reconnection
//! backoff, and the [`bridge::EngineBridge`] that keeps a live event
//! connection and fans [`events::EngineEvent`]s out to subscribers.

pub mod api;
pub mod bridge;
pub mod client;
pub mod events;
pub mod messages;
pub mod processor;
pub mod reconnect;
