pub mod channel;
pub mod config;
pub mod frame;
pub mod shutdown;
pub mod state;
