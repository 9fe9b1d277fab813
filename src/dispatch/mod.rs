//! dispatch: action envelope in, one adapter call, response envelope out.
//!
//! | Error | Status |
//! |-------|--------|
//! | unknown action, missing payload | 400 |
//! | peer said unauthorized | 401 |
//! | any other adapter failure | 500 |
//! | success | 202 |

mod dispatcher;
mod route;

pub use dispatcher::{DispatchError, Dispatched, Dispatcher};
pub use route::{grpc_logger, summary, Route, RouteTable, Summarize};
