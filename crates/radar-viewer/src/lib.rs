//! Weather-radar frame sequencing and playback.
//!
//! [`core::ViewerCore`] owns a [`session::ProductSession`], which loads
//! metadata through a [`fetch::MetadataSource`], turns it into frames with
//! [`frames::FrameBuilder`] and hands them to the
//! [`playback::PlaybackController`]. Visible changes are published through
//! [`sink::ViewStateSink`] and served by [`http`].

pub mod core;
pub mod fetch;
pub mod frames;
pub mod http;
pub mod playback;
pub mod session;
pub mod sink;
