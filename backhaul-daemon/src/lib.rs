//! Backhaul daemon runtime: watcher + throttle + backup processor + socket
//! control server.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
mod throttle;
mod watch;

pub use error::DaemonError;
pub use protocol::{
    request_pull, request_push, request_set_paths, request_status, request_stop, send_request,
    DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
pub use throttle::Throttle;
