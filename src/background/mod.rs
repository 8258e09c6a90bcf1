pub mod tombstone_reaper;
