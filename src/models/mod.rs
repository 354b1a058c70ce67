pub mod event;
pub mod event_log;
pub mod payment;
pub mod subscription;
