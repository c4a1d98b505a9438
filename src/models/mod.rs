//! Data models for the news client.
//!
//! Entities mirror the local tables; `network` holds the change-feed wire types.

mod change_list;
mod network;
mod news;
mod search;
mod topic;
mod user_data;

pub use change_list::*;
pub use network::*;
pub use news::*;
pub use search::*;
pub use topic::*;
pub use user_data::*;
