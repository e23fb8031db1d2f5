/// Vulkan debug messenger - routes validation layer messages into the Lumen logger
///
/// Messages are counted per severity and identical messages are grouped,
/// so a report can be printed at shutdown.

use ash::vk;
use colored::*;
use lumen_gpu::{engine_debug, engine_error, engine_info, engine_warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

const SOURCE: &str = "lumen::vulkan::validation";

/// Set between messenger creation and destruction
static ENABLED: AtomicBool = AtomicBool::new(false);

static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrences per message text
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Validation message counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn counter(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> &AtomicU32 {
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            &self.errors
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            &self.warnings
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            &self.info
        } else {
            &self.verbose
        }
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [&self.errors, &self.warnings, &self.info, &self.verbose] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Count one occurrence of `message`, returning the new total
fn track_message(message: &str) -> u32 {
    let mut tracker = MESSAGE_TRACKER.lock();
    let count = tracker.get_or_insert_with(FxHashMap::default).entry(message.to_string()).or_insert(0);
    *count += 1;
    *count
}

fn init_debug_config() {
    VALIDATION_STATS.reset();
    *MESSAGE_TRACKER.lock() = Some(FxHashMap::default());
    ENABLED.store(true, Ordering::Release);
}

/// Stop routing messages (called before the messenger is destroyed)
pub(crate) fn cleanup_debug_config() {
    ENABLED.store(false, Ordering::Release);
}

/// Current validation statistics
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Print validation statistics report
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "✓ No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());
    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    if let Some(tracker) = MESSAGE_TRACKER.lock().as_ref() {
        let duplicate_count = tracker.values().filter(|&&count| count > 1).count();
        if duplicate_count > 0 {
            println!("\n  {} {} message(s) appeared multiple times", "ℹ".cyan(), duplicate_count);
        }
    }

    println!("{}\n", "====================================".bright_blue().bold());
}

/// Debug utils messenger owned by the GPU context
pub(crate) struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub(crate) fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self, vk::Result> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        init_debug_config();
        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
        Ok(Self { loader, messenger })
    }

    /// Must run before the instance is destroyed
    pub(crate) unsafe fn destroy(self) {
        self.loader.destroy_debug_utils_messenger(self.messenger, None);
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if !ENABLED.load(Ordering::Acquire) || p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown".into()
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };
    let message = if callback_data.p_message.is_null() {
        "No message".into()
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    VALIDATION_STATS.counter(message_severity).fetch_add(1, Ordering::Relaxed);
    let occurrences = track_message(&message);

    let type_str = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    };
    let repeat = if occurrences > 1 { format!(" [x{}]", occurrences) } else { String::new() };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        engine_error!(SOURCE, "[{}]{} {}: {}", type_str, repeat, message_id_name, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        engine_warn!(SOURCE, "[{}]{} {}: {}", type_str, repeat, message_id_name, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        engine_info!(SOURCE, "[{}]{} {}: {}", type_str, repeat, message_id_name, message);
    } else {
        engine_debug!(SOURCE, "[{}]{} {}: {}", type_str, repeat, message_id_name, message);
    }

    vk::FALSE // Don't abort Vulkan execution
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_identical_messages_are_grouped() {
        init_debug_config();
        assert_eq!(track_message("same"), 1);
        assert_eq!(track_message("same"), 2);
        assert_eq!(track_message("other"), 1);
        cleanup_debug_config();
    }

    #[test]
    #[serial]
    fn test_counters_follow_severity() {
        init_debug_config();
        VALIDATION_STATS.counter(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR).fetch_add(1, Ordering::Relaxed);
        VALIDATION_STATS.counter(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING).fetch_add(2, Ordering::Relaxed);
        VALIDATION_STATS.counter(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE).fetch_add(1, Ordering::Relaxed);

        let stats = get_validation_stats();
        assert_eq!(stats, ValidationStats { errors: 1, warnings: 2, info: 0, verbose: 1 });
        assert_eq!(stats.total(), 4);

        init_debug_config();
        assert_eq!(get_validation_stats().total(), 0);
        cleanup_debug_config();
    }
}
