// SPDX-License-Identifier: Apache-2.0

mod file_id;
mod following;
mod splitter;

pub use file_id::FileId;
pub use following::{FollowingReader, ReadOutcome};
pub use splitter::LineSplitter;
