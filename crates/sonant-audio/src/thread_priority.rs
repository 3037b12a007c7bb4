//! Real-time priority for engine threads
//!
//! Workers, the lookahead writer and device threads ask for elevated
//! scheduling once, right after they start. Failure is never fatal: the
//! thread keeps running at normal priority.
//!
//! - **macOS**: `USER_INTERACTIVE` QoS class
//! - **Windows**: MMCSS "Pro Audio" task, falling back to `TIME_CRITICAL`
//! - **Linux**: `SCHED_FIFO`, falling back to `SCHED_RR` (needs `CAP_SYS_NICE`)

use std::cell::Cell;

thread_local! {
    static PROMOTED: Cell<bool> = const { Cell::new(false) };
}

/// What an engine thread does; device threads get the highest priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    Device,
    Worker,
    LookaheadWriter,
}

impl ThreadRole {
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    fn fifo_priority(self) -> i32 {
        match self {
            ThreadRole::Device => 80,
            ThreadRole::Worker => 70,
            ThreadRole::LookaheadWriter => 60,
        }
    }
}

/// Result of priority elevation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityResult {
    Success,
    /// This thread was already promoted
    AlreadySet,
    /// Non-fatal; the thread keeps its default priority
    Failed,
    Unsupported,
}

/// Elevate the calling thread; only the first call per thread does any work
pub fn promote_current_thread(role: ThreadRole) -> PriorityResult {
    if PROMOTED.with(|p| p.replace(true)) {
        return PriorityResult::AlreadySet;
    }

    let result = platform_set_priority(role);
    match result {
        PriorityResult::Success => log::debug!("{:?} thread elevated to real-time priority", role),
        PriorityResult::Failed => {
            log::warn!("Failed to set real-time priority for {:?} thread (non-fatal)", role);
            PROMOTED.with(|p| p.set(false));
        }
        PriorityResult::Unsupported => {
            log::debug!("Real-time priority not supported on this platform")
        }
        PriorityResult::AlreadySet => {}
    }
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// macOS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(target_os = "macos")]
fn platform_set_priority(_role: ThreadRole) -> PriorityResult {
    const QOS_CLASS_USER_INTERACTIVE: u32 = 0x21;

    unsafe extern "C" {
        fn pthread_set_qos_class_self_np(qos_class: u32, relative_priority: i32) -> i32;
    }

    let result = unsafe { pthread_set_qos_class_self_np(QOS_CLASS_USER_INTERACTIVE, 0) };
    if result == 0 {
        PriorityResult::Success
    } else {
        log::debug!("pthread_set_qos_class_self_np failed: {}", result);
        PriorityResult::Failed
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Windows
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(target_os = "windows")]
fn platform_set_priority(_role: ThreadRole) -> PriorityResult {
    use windows::Win32::System::Threading::{
        AvSetMmThreadCharacteristicsW, GetCurrentThread, SetThreadPriority,
        THREAD_PRIORITY_TIME_CRITICAL,
    };
    use windows::core::PCWSTR;

    let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
    let mut task_index: u32 = 0;
    let mmcss = unsafe { AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) };
    if matches!(&mmcss, Ok(handle) if !handle.is_invalid()) {
        return PriorityResult::Success;
    }

    log::debug!("MMCSS registration failed, falling back to thread priority");
    match unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_TIME_CRITICAL) } {
        Ok(()) => PriorityResult::Success,
        Err(_) => PriorityResult::Failed,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Linux
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(target_os = "linux")]
fn platform_set_priority(role: ThreadRole) -> PriorityResult {
    use libc::{SCHED_FIFO, SCHED_RR, sched_param, sched_setscheduler};

    // pid 0 targets the calling thread
    let param = sched_param {
        sched_priority: role.fifo_priority(),
    };
    if unsafe { sched_setscheduler(0, SCHED_FIFO, &param) } == 0 {
        return PriorityResult::Success;
    }

    log::debug!("SCHED_FIFO failed (need CAP_SYS_NICE), trying SCHED_RR");
    if unsafe { sched_setscheduler(0, SCHED_RR, &param) } == 0 {
        PriorityResult::Success
    } else {
        PriorityResult::Failed
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
fn platform_set_priority(_role: ThreadRole) -> PriorityResult {
    PriorityResult::Unsupported
}
