//! Frame loop and the unix-socket daemon that exposes derived hand state.

mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use pipeline::run_frame_loop;
pub use server::{client_request, run_daemon};
