//! Venue Adapters
//!
//! Implementations of [`crate::application::ports::VenuePort`].

mod paper;

pub use paper::PaperVenue;
