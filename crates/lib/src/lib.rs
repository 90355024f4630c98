//! botrelay core library: relays chat activities to a hosted inference endpoint and
//! delivers the model's reply back to the conversation.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod secrets;
