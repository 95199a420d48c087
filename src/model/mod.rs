pub mod attendance;
pub mod directory;
pub mod notification;
pub mod queue;
pub mod scan;
