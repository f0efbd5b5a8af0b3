mod channel;
mod dead_letter;
mod metadata_document;
mod object_key;
mod raw_event;
mod result;
mod sinks;

pub use channel::*;
pub use dead_letter::*;
pub use metadata_document::*;
pub use object_key::*;
pub use raw_event::*;
pub use result::*;
pub use sinks::*;
