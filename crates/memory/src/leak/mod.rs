//! Leak ledger
//!
//! An address-keyed record of allocations that have not been released yet.
//! It is independent of the pools: any address can be tracked, and turning
//! tracking off never changes allocator behaviour.
//!
//! # Example
//! ```
//! use hoard_memory::leak::LeakLedger;
//! use hoard_memory::track_alloc;
//!
//! let ledger = LeakLedger::new();
//! let buffer = vec![0u8; 64];
//! track_alloc!(ledger, buffer.as_ptr(), [u8], buffer.len());
//! assert_eq!(ledger.leak_count(), 1);
//!
//! assert!(ledger.track_deallocation(buffer.as_ptr() as usize));
//! assert!(ledger.check_for_leaks());
//! ```

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::panic::Location;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::utils::{format_bytes, short_type_name};

#[cfg(feature = "logging")]
use hoard_log::{debug, warn};

/// Leak ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Record new allocations
    pub enabled: bool,
    /// Capture a stack trace per allocation (needs the `stack-traces` feature)
    pub capture_stack_traces: bool,
    /// Frames kept per stack trace
    pub max_stack_depth: usize,
    /// Report remaining entries when the ledger is dropped
    pub check_on_drop: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_stack_traces: false,
            max_stack_depth: 16,
            check_on_drop: false,
        }
    }
}

impl LedgerConfig {
    /// Development preset - traces and an exit-time check
    pub fn development() -> Self {
        Self {
            capture_stack_traces: true,
            check_on_drop: true,
            ..Self::default()
        }
    }

    /// Production preset - tracking off
    pub fn production() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// One allocation that has not been released
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakRecord {
    /// Tracked address
    pub address: usize,
    /// Size in bytes
    pub size: usize,
    /// Type (or description) of the allocation
    pub type_name: String,
    /// Source file of the allocation site
    pub file: &'static str,
    /// Source line of the allocation site
    pub line: u32,
    /// Captured frames, innermost first
    pub stack_trace: Option<Vec<String>>,
    /// Order in which entries were recorded
    pub sequence: u64,
}

/// Anything that can be tracked by address
pub trait TrackedAddress {
    /// Numeric address
    fn address(&self) -> usize;
}

impl TrackedAddress for usize {
    fn address(&self) -> usize {
        *self
    }
}

impl<T: ?Sized> TrackedAddress for *const T {
    fn address(&self) -> usize {
        self.cast::<u8>() as usize
    }
}

impl<T: ?Sized> TrackedAddress for *mut T {
    fn address(&self) -> usize {
        self.cast::<u8>() as usize
    }
}

impl<T: ?Sized> TrackedAddress for NonNull<T> {
    fn address(&self) -> usize {
        self.as_ptr().cast::<u8>() as usize
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: HashMap<usize, LeakRecord>,
    next_sequence: u64,
}

/// Thread-safe allocation ledger
#[derive(Debug)]
pub struct LeakLedger {
    config: LedgerConfig,
    enabled: AtomicBool,
    state: Mutex<LedgerState>,
}

impl LeakLedger {
    /// Creates an enabled ledger
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    /// Creates a ledger from `config`
    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            config,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Ledger configuration
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Whether new allocations are recorded
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turns recording on or off; existing entries are kept
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Records an allocation made at the caller's location
    #[track_caller]
    pub fn track_allocation(&self, address: usize, size: usize, type_name: &str) {
        let site = Location::caller();
        self.track_allocation_at(address, size, type_name, site.file(), site.line());
    }

    /// Records an allocation made at `file:line`
    ///
    /// Tracking an address again replaces its previous entry.
    pub fn track_allocation_at(
        &self,
        address: usize,
        size: usize,
        type_name: &str,
        file: &'static str,
        line: u32,
    ) {
        if !self.is_enabled() {
            return;
        }

        let stack_trace = self.capture_stack();

        let mut state = self.state.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let replaced = state.entries.insert(
            address,
            LeakRecord {
                address,
                size,
                type_name: type_name.to_string(),
                file,
                line,
                stack_trace,
                sequence,
            },
        );
        drop(state);

        #[cfg(feature = "logging")]
        if let Some(old) = replaced {
            debug!(
                address,
                previous = %old.type_name,
                "Address tracked again without being released"
            );
        }
        #[cfg(not(feature = "logging"))]
        let _ = replaced;
    }

    /// Removes the entry for `address`, returning whether it was tracked
    ///
    /// Works while tracking is disabled so that earlier entries still clear.
    pub fn track_deallocation(&self, address: usize) -> bool {
        self.state.lock().entries.remove(&address).is_some()
    }

    /// Whether `address` currently has an entry
    pub fn is_tracked(&self, address: usize) -> bool {
        self.state.lock().entries.contains_key(&address)
    }

    /// Outstanding entries, oldest first
    pub fn leaks(&self) -> Vec<LeakRecord> {
        let mut leaks: Vec<_> = self.state.lock().entries.values().cloned().collect();
        leaks.sort_by_key(|record| record.sequence);
        leaks
    }

    /// Number of outstanding entries
    pub fn leak_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Bytes held by outstanding entries
    pub fn leaked_bytes(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .map(|record| record.size)
            .sum()
    }

    /// Forgets every entry
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Reports outstanding entries through the log
    ///
    /// Returns `true` when nothing leaked.
    pub fn check_for_leaks(&self) -> bool {
        let leaks = self.leaks();
        if leaks.is_empty() {
            #[cfg(feature = "logging")]
            debug!("No memory leaks detected");
            return true;
        }

        let report = render_report(&leaks);

        #[cfg(feature = "logging")]
        warn!(
            leaks = leaks.len(),
            bytes = leaks.iter().map(|r| r.size).sum::<usize>(),
            "Memory leaks detected\n{report}"
        );
        #[cfg(not(feature = "logging"))]
        eprintln!("{report}");

        false
    }

    /// Writes the leak report to `writer`
    ///
    /// Returns `true` when nothing leaked. Write failures are logged.
    pub fn check_for_leaks_to<W: Write + ?Sized>(&self, writer: &mut W) -> bool {
        let leaks = self.leaks();
        let report = if leaks.is_empty() {
            "No memory leaks detected\n".to_string()
        } else {
            render_report(&leaks)
        };

        if let Err(_err) = writer.write_all(report.as_bytes()).and_then(|()| writer.flush()) {
            #[cfg(feature = "logging")]
            warn!(error = %_err, "Failed to write leak report");
        }

        leaks.is_empty()
    }

    /// Writes the leak report to the file at `path`
    ///
    /// Returns `true` when nothing leaked. IO failures are logged.
    pub fn check_for_leaks_to_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match File::create(path) {
            Ok(file) => self.check_for_leaks_to(&mut BufWriter::new(file)),
            Err(_err) => {
                #[cfg(feature = "logging")]
                warn!(path = %path.display(), error = %_err, "Failed to create leak report");
                self.leak_count() == 0
            }
        }
    }

    #[cfg(feature = "stack-traces")]
    fn capture_stack(&self) -> Option<Vec<String>> {
        if !self.config.capture_stack_traces {
            return None;
        }

        let bt = backtrace::Backtrace::new();
        let frames = bt
            .frames()
            .iter()
            .filter_map(|frame| {
                let symbol = frame.symbols().first()?;
                let name = symbol
                    .name()
                    .and_then(|n| n.as_str())
                    .unwrap_or("<unknown>");

                if name.starts_with("backtrace::") || name.contains("LeakLedger") {
                    return None;
                }

                let file = symbol
                    .filename()
                    .map_or_else(|| "<unknown>".to_string(), |p| p.display().to_string());
                Some(format!("{name} ({file}:{})", symbol.lineno().unwrap_or(0)))
            })
            .take(self.config.max_stack_depth)
            .collect();

        Some(frames)
    }

    #[cfg(not(feature = "stack-traces"))]
    fn capture_stack(&self) -> Option<Vec<String>> {
        None
    }
}

impl Default for LeakLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LeakLedger {
    fn drop(&mut self) {
        if self.config.check_on_drop {
            self.check_for_leaks();
        }
    }
}

/// Groups leaks by type and renders the report text
fn render_report(leaks: &[LeakRecord]) -> String {
    let mut by_type: BTreeMap<&str, Vec<&LeakRecord>> = BTreeMap::new();
    for record in leaks {
        by_type
            .entry(record.type_name.as_str())
            .or_default()
            .push(record);
    }

    let total: usize = leaks.iter().map(|r| r.size).sum();
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, leaks.len(), total, &by_type);
    out
}

fn write_report(
    out: &mut String,
    count: usize,
    total: usize,
    by_type: &BTreeMap<&str, Vec<&LeakRecord>>,
) -> core::fmt::Result {
    use core::fmt::Write as _;

    writeln!(out, "=== Memory Leak Report ===")?;
    writeln!(out, "{count} leak(s), {} total", format_bytes(total))?;

    for (type_name, records) in by_type {
        let bytes: usize = records.iter().map(|r| r.size).sum();
        writeln!(
            out,
            "\n{}: {} leak(s), {}",
            short_type_name(type_name),
            records.len(),
            format_bytes(bytes)
        )?;

        for record in records {
            writeln!(
                out,
                "  {:#x}: {} bytes at {}:{}",
                record.address, record.size, record.file, record.line
            )?;
            for frame in record.stack_trace.iter().flatten() {
                writeln!(out, "      {frame}")?;
            }
        }
    }

    Ok(())
}

/// Records an allocation at the current source location
///
/// `track_alloc!(ledger, ptr, Type)` records `size_of::<Type>()` bytes,
/// `track_alloc!(ledger, ptr, Type, size)` an explicit size. `ptr` may be a
/// `usize`, raw pointer or `NonNull`.
#[macro_export]
macro_rules! track_alloc {
    ($ledger:expr, $ptr:expr, $ty:ty) => {
        $crate::track_alloc!($ledger, $ptr, $ty, ::core::mem::size_of::<$ty>())
    };
    ($ledger:expr, $ptr:expr, $ty:ty, $size:expr) => {
        $ledger.track_allocation_at(
            $crate::leak::TrackedAddress::address(&$ptr),
            $size,
            ::core::any::type_name::<$ty>(),
            ::core::file!(),
            ::core::line!(),
        )
    };
}
