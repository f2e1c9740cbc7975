//! Filenames for newly stored objects.
//!
//! Names carry a millisecond timestamp and a random suffix so that re-runs
//! and rapid repeated uploads never collide.

use rand::RngCore;
use time::OffsetDateTime;

fn unique_suffix() -> String {
    let mut bytes = [0u8; 4];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn now_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// `image_{index}_{millis}_{suffix}.{ext}` for an item moved out of a reference list.
pub fn migrated_filename(index: usize, extension: &str) -> String {
    format!(
        "image_{index}_{}_{}.{extension}",
        now_millis(),
        unique_suffix()
    )
}

/// `avatar-{millis}-{suffix}.{ext}` for a single-image upload.
pub fn avatar_filename(extension: &str) -> String {
    format!("avatar-{}-{}.{extension}", now_millis(), unique_suffix())
}
