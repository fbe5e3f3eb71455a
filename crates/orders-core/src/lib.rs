pub mod action;
pub mod config;
pub mod error;
pub mod io;
pub mod notify;
pub mod order;
pub mod paths;
pub mod query;
pub mod registry;
pub mod schedule;
pub mod store;

pub use error::{OrdersError, Result};
pub use order::{OrderState, OrderStatus, StandingOrder};
pub use registry::{NewOrder, OrderPatch, Registry};
pub use schedule::{compute_next_run, Frequency, ScheduleDescriptor};
