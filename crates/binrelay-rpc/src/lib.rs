//! binrelay gateway plumbing: command line, registration listener, local MCP
//! methods and the stdio and HTTP transports.

pub mod cli;
pub mod handler;
pub mod listener;
pub mod server;
pub mod stdio;

pub use handler::McpHandler;
pub use listener::{start_listener, ListenerHandle};
pub use server::start_server;
pub use stdio::serve_stdio;
