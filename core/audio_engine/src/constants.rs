/// Tolerance for comparing mixed `f32` samples in tests and assertions.
pub const AUDIO_SAMPLE_EPSILON: f32 = 1e-6;

/// Full-scale value used when exporting mixed samples as signed 16-bit PCM.
pub const I16_FULL_SCALE: f32 = 32767.0;

/// Reads issued by `retried_read` after the first one comes back empty.
pub const READ_RETRY_ATTEMPTS: u32 = 10;

/// Sleep before the first retry; doubled before each following retry.
pub const READ_RETRY_INITIAL_DELAY_MS: u64 = 1;
