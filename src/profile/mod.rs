pub mod codec;
pub mod model;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod store;
