pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{INLINE_PNG, INLINE_TEXT_AS_JPEG, services, testing_config};
#[allow(unused_imports)]
pub use mocks::{FlakyRecordStore, ScriptedStore};
