use std::path::PathBuf;

pub fn default_version() -> u32 {
    1
}

pub fn default_queue_dir() -> PathBuf {
    PathBuf::from(".decision-queue")
}

pub fn default_poll_interval_ms() -> u64 {
    1500
}

pub fn default_debounce_ms() -> u64 {
    300
}

pub fn default_custom_input_ttl_sec() -> u64 {
    300 // 5 minutes
}

pub fn default_true() -> bool {
    true
}
