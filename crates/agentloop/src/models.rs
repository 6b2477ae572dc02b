//! These models represent the objects passed between the agent, its tools and the
//! completion provider.
//!
//! The conversation history is a flat list of [`message::Message`] values, one role per
//! entry. Tool definitions and the structured response format in [`tool`] follow the
//! shape chat-completion APIs expect, so a provider can forward them without rewriting.
pub mod message;
pub mod tool;
