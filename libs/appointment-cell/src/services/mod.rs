pub mod booking;
pub mod calendar;
pub mod conflict;
pub mod lifecycle;
pub mod reschedule;
pub mod sweep;

pub use booking::BookingService;
pub use calendar::CalendarService;
pub use conflict::ConflictValidator;
pub use lifecycle::LifecycleService;
pub use reschedule::RescheduleService;
pub use sweep::SweepService;
