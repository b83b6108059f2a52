use ort::session::builder::SessionBuilder;

const DEFAULT_MAX_THREADS: usize = 4;

/// Intra-op threads
pub const THREADS_ENV: &str = "DOCSHIELD_OCR_THREADS";
/// Inter-op threads
pub const INTER_THREADS_ENV: &str = "DOCSHIELD_OCR_INTER_THREADS";

fn parse_env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.trim().parse::<usize>().ok()
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_MAX_THREADS)
        .clamp(1, DEFAULT_MAX_THREADS)
}

/// `(intra, inter)` thread counts, environment first.
pub fn thread_settings() -> (usize, usize) {
    let intra = parse_env_usize(THREADS_ENV)
        .filter(|v| *v > 0)
        .unwrap_or_else(default_thread_count);
    let inter = parse_env_usize(INTER_THREADS_ENV)
        .filter(|v| *v > 0)
        .unwrap_or(1);
    (intra, inter)
}

pub fn apply_session_threads(builder: SessionBuilder) -> Result<SessionBuilder, ort::Error> {
    let (intra, inter) = thread_settings();
    log::debug!("[Paddle] session threads: intra={}, inter={}", intra, inter);

    Ok(builder
        .with_intra_threads(intra)?
        .with_inter_threads(inter)?
        .with_parallel_execution(false)?)
}
