pub mod channels;
pub mod lock;
pub mod read;
pub mod watch;
