// perf.rs - Worker phase timings and declaration counters
//
// Every environment build, patch flush and loader refresh is recorded per
// phase (count, total, slowest). Logging is controlled via SIDEKICK_PERF:
//
//   SIDEKICK_PERF=1        # Log each phase as it completes
//   SIDEKICK_PERF=verbose  # Also warn when a phase runs over its budget

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PerfMode {
    Off,
    On,
    Verbose,
}

static PERF_MODE: OnceLock<PerfMode> = OnceLock::new();

fn parse_mode(value: Option<&str>) -> PerfMode {
    match value.map(str::to_lowercase).as_deref() {
        None | Some("") | Some("0") | Some("false") => PerfMode::Off,
        Some("verbose") => PerfMode::Verbose,
        Some(_) => PerfMode::On,
    }
}

fn mode() -> PerfMode {
    *PERF_MODE.get_or_init(|| parse_mode(std::env::var("SIDEKICK_PERF").ok().as_deref()))
}

pub fn is_enabled() -> bool {
    mode() != PerfMode::Off
}

pub fn is_verbose() -> bool {
    mode() == PerfMode::Verbose
}

/// Timed stages of a worker's life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Building the virtual file set and analysis session at init
    EnvironmentBuild,
    /// Applying a debounced patch, loader refresh included
    Flush,
    /// Scanning the document and loading newly referenced declarations
    LoaderRefresh,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::EnvironmentBuild, Phase::Flush, Phase::LoaderRefresh];

    pub fn label(self) -> &'static str {
        match self {
            Phase::EnvironmentBuild => "environment build",
            Phase::Flush => "flush",
            Phase::LoaderRefresh => "loader refresh",
        }
    }

    /// Duration past which verbose mode warns
    pub fn budget(self) -> Duration {
        match self {
            Phase::EnvironmentBuild => Duration::from_secs(2),
            Phase::Flush => Duration::from_millis(50),
            Phase::LoaderRefresh => Duration::from_millis(500),
        }
    }

    fn slot(self) -> &'static PhaseSlot {
        &PHASES[self as usize]
    }
}

struct PhaseSlot {
    count: AtomicU64,
    total_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl PhaseSlot {
    const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
            max_micros: AtomicU64::new(0),
        }
    }
}

static PHASES: [PhaseSlot; 3] = [PhaseSlot::new(), PhaseSlot::new(), PhaseSlot::new()];

/// Snapshot of one phase's timings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseStats {
    pub count: u64,
    pub total: Duration,
    pub slowest: Duration,
}

impl PhaseStats {
    pub fn mean(&self) -> Duration {
        match self.count {
            0 => Duration::ZERO,
            n => self.total / n.min(u64::from(u32::MAX)) as u32,
        }
    }
}

/// Record one run of `phase`
pub fn record(phase: Phase, elapsed: Duration) {
    let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    let slot = phase.slot();
    slot.count.fetch_add(1, Ordering::Relaxed);
    slot.total_micros.fetch_add(micros, Ordering::Relaxed);
    slot.max_micros.fetch_max(micros, Ordering::Relaxed);

    if !is_enabled() {
        return;
    }
    log::info!("[PERF] {} took {:?}", phase.label(), elapsed);
    if is_verbose() && elapsed > phase.budget() {
        log::warn!(
            "[PERF] {} over budget ({:?} > {:?})",
            phase.label(),
            elapsed,
            phase.budget()
        );
    }
}

pub fn phase_stats(phase: Phase) -> PhaseStats {
    let slot = phase.slot();
    PhaseStats {
        count: slot.count.load(Ordering::Relaxed),
        total: Duration::from_micros(slot.total_micros.load(Ordering::Relaxed)),
        slowest: Duration::from_micros(slot.max_micros.load(Ordering::Relaxed)),
    }
}

/// Records its phase when stopped or dropped, whichever comes first
pub struct PhaseTimer {
    phase: Phase,
    start: Option<Instant>,
}

impl PhaseTimer {
    pub fn start(phase: Phase) -> Self {
        Self {
            phase,
            start: Some(Instant::now()),
        }
    }

    /// Record now and return the elapsed time
    pub fn stop(mut self) -> Duration {
        self.record().unwrap_or_default()
    }

    fn record(&mut self) -> Option<Duration> {
        let elapsed = self.start.take()?.elapsed();
        record(self.phase, elapsed);
        Some(elapsed)
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.record();
    }
}

/// Shape of the session at the last environment build
#[derive(Debug, Default, Clone)]
pub struct SessionShape {
    /// Baseline lib files removed before the session was created
    pub lib_files_stripped: usize,
    /// Files in the virtual file set when the session was created
    pub files_in_session: usize,
}

static SESSION_SHAPE: OnceLock<std::sync::Mutex<SessionShape>> = OnceLock::new();

fn session_shape() -> &'static std::sync::Mutex<SessionShape> {
    SESSION_SHAPE.get_or_init(|| std::sync::Mutex::new(SessionShape::default()))
}

pub fn record_session_shape(files: usize, stripped: usize) {
    if let Ok(mut shape) = session_shape().lock() {
        shape.files_in_session = files;
        shape.lib_files_stripped = stripped;
    }
}

pub fn last_session_shape() -> SessionShape {
    session_shape()
        .lock()
        .map(|shape| shape.clone())
        .unwrap_or_default()
}

/// Log every phase and the declaration counters
pub fn log_summary() {
    if !is_enabled() {
        return;
    }

    let shape = last_session_shape();
    log::info!(
        "[PERF] Session: {} files, {} lib files stripped",
        shape.files_in_session,
        shape.lib_files_stripped
    );
    for phase in Phase::ALL {
        let stats = phase_stats(phase);
        if stats.count == 0 {
            continue;
        }
        log::info!(
            "[PERF] {}: {} runs, mean {:?}, slowest {:?}",
            phase.label(),
            stats.count,
            stats.mean(),
            stats.slowest
        );
    }
    log::info!(
        "[PERF] Declarations: {} fetched, {} from cache, {} fetch failures",
        get_declarations_fetched(),
        get_declarations_from_cache(),
        get_fetch_failures()
    );
}

static DECLARATIONS_FETCHED: AtomicUsize = AtomicUsize::new(0);
static DECLARATIONS_FROM_CACHE: AtomicUsize = AtomicUsize::new(0);
static FETCH_FAILURES: AtomicUsize = AtomicUsize::new(0);

pub fn increment_declarations_fetched() {
    DECLARATIONS_FETCHED.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_declarations_from_cache(count: usize) {
    DECLARATIONS_FROM_CACHE.fetch_add(count, Ordering::Relaxed);
}

pub fn increment_fetch_failures() {
    FETCH_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn get_declarations_fetched() -> usize {
    DECLARATIONS_FETCHED.load(Ordering::Relaxed)
}

pub fn get_declarations_from_cache() -> usize {
    DECLARATIONS_FROM_CACHE.load(Ordering::Relaxed)
}

pub fn get_fetch_failures() -> usize {
    FETCH_FAILURES.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode(None), PerfMode::Off);
        assert_eq!(parse_mode(Some("")), PerfMode::Off);
        assert_eq!(parse_mode(Some("0")), PerfMode::Off);
        assert_eq!(parse_mode(Some("FALSE")), PerfMode::Off);
        assert_eq!(parse_mode(Some("1")), PerfMode::On);
        assert_eq!(parse_mode(Some("Verbose")), PerfMode::Verbose);
    }

    // Phase slots are process-wide, so these assert deltas only
    #[test]
    fn test_record_tracks_count_and_slowest() {
        let before = phase_stats(Phase::EnvironmentBuild);
        record(Phase::EnvironmentBuild, Duration::from_millis(3));
        record(Phase::EnvironmentBuild, Duration::from_secs(120));
        let after = phase_stats(Phase::EnvironmentBuild);

        assert!(after.count >= before.count + 2);
        assert!(after.total >= before.total + Duration::from_millis(120_003));
        assert!(after.slowest >= Duration::from_secs(120));
    }

    #[test]
    fn test_timer_records_once() {
        let before = phase_stats(Phase::LoaderRefresh).count;
        let timer = PhaseTimer::start(Phase::LoaderRefresh);
        std::thread::sleep(Duration::from_millis(5));
        let elapsed = timer.stop();

        assert!(elapsed >= Duration::from_millis(5));
        assert!(phase_stats(Phase::LoaderRefresh).count > before);
    }

    #[test]
    fn test_timer_records_on_drop() {
        let before = phase_stats(Phase::Flush).count;
        {
            let _timer = PhaseTimer::start(Phase::Flush);
        }
        assert!(phase_stats(Phase::Flush).count > before);
    }

    #[test]
    fn test_mean_of_empty_stats_is_zero() {
        assert_eq!(PhaseStats::default().mean(), Duration::ZERO);
        let stats = PhaseStats {
            count: 4,
            total: Duration::from_millis(100),
            slowest: Duration::from_millis(40),
        };
        assert_eq!(stats.mean(), Duration::from_millis(25));
    }

    #[test]
    fn test_session_shape_keeps_last_build() {
        record_session_shape(12, 3);
        let shape = last_session_shape();
        assert!(shape.files_in_session > 0);
    }

    #[test]
    fn test_counters_are_monotonic() {
        let before = get_fetch_failures();
        increment_fetch_failures();
        assert!(get_fetch_failures() > before);

        let before = get_declarations_from_cache();
        increment_declarations_from_cache(3);
        assert!(get_declarations_from_cache() >= before + 3);
    }
}
