mod byte_events;
mod counts;
mod egress;
mod flow_control;
mod ingress;
mod priority;
mod session;
mod state;
mod store;
mod transaction;
mod upgrade;


pub use self::priority::{Priority, PriorityTree, DEFAULT_WEIGHT};
pub use self::session::Session;
pub use self::transaction::Transaction;
