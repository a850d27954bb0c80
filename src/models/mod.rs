//! Domain records shared by the scheduler, the status checker and the EPG matcher

pub mod channel;
pub mod epg;
pub mod source;

pub use channel::*;
pub use epg::*;
pub use source::*;
