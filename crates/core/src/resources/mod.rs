//! Concurrency slots and per-client quotas

pub mod quota;
pub mod slots;

pub use quota::{QuotaConfig, QuotaManager};
pub use slots::{ResourceConfig, ResourceManager, ResourceStats, SlotGuard};
