//! Client-side pieces: the upload queue and the lightbox scroll-back state.

pub mod form;
pub mod last_viewed;
pub mod transport;
pub mod upload_manager;
pub mod upload_queue;
