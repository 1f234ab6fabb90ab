pub mod report;
pub mod session;

pub use report::WeeklyVitalsRow;
pub use session::SessionRow;
