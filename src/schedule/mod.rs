pub mod models;
pub mod reconciler;
pub mod registers;

pub use models::FeeSchedule;
pub use reconciler::{ReconcileOutcome, ScheduleReconciler};
