//! Agent bridge core library: relays chat messages from a Mattermost event stream
//! to a conversational backend and posts the replies back, keeping one continuity
//! token per conversation.

pub mod backend;
pub mod backoff;
pub mod config;
pub mod continuity;
pub mod dispatch;
pub mod supervisor;
pub mod transport;
pub mod util;
