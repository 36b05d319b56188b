pub mod scheduler;
pub mod service;

pub use scheduler::{Scheduler, Slot, SlotLatch, SlotTimes};
pub use service::{EvaluationOutcome, EvaluationService, EvaluationSettings};
