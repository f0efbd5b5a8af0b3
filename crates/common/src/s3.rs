mod raw_object_store;

pub use raw_object_store::*;
