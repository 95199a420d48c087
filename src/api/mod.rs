pub mod attendance;
pub mod sync;
