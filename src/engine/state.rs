/// Progress notifications emitted while a manifest is being synchronized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    Started {
        total_files: usize,
    },
    FileCompleted {
        path: String,
        attempts: u32,
    },
    FileFailed {
        path: String,
        attempt: u32,
        mirror: String,
        error: String,
    },
    Finished,
}
