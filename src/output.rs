//! CLI output formatting.
//!
//! Output is artifact-centric: every line leads with the file name an event
//! is about, so the log reads as an inventory of the output directory.
//!
//! # Output Format
//!
//! ## Table
//!
//! ```text
//! Devices (mode: auto)
//!     iPhone_15_Pro  1179x2556  bucket 0 (896x1920)   1.331x  upscale2x  → 1792x3840
//!     UltraWide      3440x1440  bucket 3 (1728x960)   1.991x  upscale2x  → 3456x1920
//! ```
//!
//! The enlarged size is the one shared by the device's whole bucket group.
//!
//! ## Run
//!
//! ```text
//! Plan: 2 content ids × 4 devices
//!     enlargements: 4 (1 cached)
//!     finals: 8 (0 done)
//! upscale2x (3 tasks)
//!     000_00_upscaled_upscale2x_1792x3840.png: enlarged
//!         for: iPhone_15_Pro
//! 000_00_iPhone_15_Pro.jpg: written
//! Cache: 1 artifacts already cached, skipped; 11 new operations performed
//! ```
//!
//! Each event or report has a `format_*` function returning `Vec<String>` and,
//! where the CLI needs it, a `print_*` wrapper. Format functions are pure.

use crate::device::Resolved;
use crate::method::MethodTable;
use crate::naming::file_name;
use crate::plan::{UpscaleMode, group_factors, select_method};
use crate::process::{ProcessEvent, ProcessReport, StatusReport, UnitStatus};

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn status_label(status: &UnitStatus, done: &str) -> String {
    match status {
        UnitStatus::Cached => "cached".to_string(),
        UnitStatus::Done => done.to_string(),
        UnitStatus::Failed(message) => format!("failed: {message}"),
    }
}

// ============================================================================
// Device table
// ============================================================================

/// Format the resolved device table with the method and enlarged size each
/// device would get.
pub fn format_device_table(
    resolved: &Resolved,
    mode: UpscaleMode,
    methods: &MethodTable,
) -> Vec<String> {
    let mut lines = vec![format!("Devices (mode: {mode})")];

    let id_width = resolved
        .assignments
        .iter()
        .map(|a| a.device.id.len())
        .max()
        .unwrap_or(0);
    let factors = group_factors(&resolved.assignments, mode, methods);
    for a in &resolved.assignments {
        let method = select_method(mode, a.factor, methods);
        let factor = factors.get(&(a.bucket, method)).copied().unwrap_or(a.factor);
        let target = if !method.enlarges() {
            "base".to_string()
        } else {
            match methods.get(method).output_size(a.bucket.resolution(), factor) {
                Ok((w, h)) => format!("{w}x{h}"),
                Err(_) => "too large".to_string(),
            }
        };
        let size = format!("{}x{}", a.device.width, a.device.height);
        lines.push(format!(
            "{}{:<id_width$}  {:<9}  {:<19}  {:.3}x  {:<9}  \u{2192} {}",
            indent(1),
            a.device.id,
            size,
            a.bucket.to_string(),
            a.factor,
            method.name(),
            target,
        ));
    }

    if !resolved.missing.is_empty() {
        lines.push(String::new());
        lines.push("Skipped".to_string());
        for missing in &resolved.missing {
            lines.push(format!("{}{}", indent(1), missing));
        }
    }
    lines
}

pub fn print_device_table(resolved: &Resolved, mode: UpscaleMode, methods: &MethodTable) {
    for line in format_device_table(resolved, mode, methods) {
        println!("{}", line);
    }
}

// ============================================================================
// Run progress
// ============================================================================

/// Format a single progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::DeviceSkipped(e) => vec![format!("warning: {e}")],
        ProcessEvent::Planned {
            content_ids,
            devices,
            tasks,
            cached_tasks,
            finals,
            done_finals,
        } => vec![
            format!("Plan: {content_ids} content ids \u{d7} {devices} devices"),
            format!("{}enlargements: {tasks} ({cached_tasks} cached)", indent(1)),
            format!("{}finals: {finals} ({done_finals} done)", indent(1)),
        ],
        ProcessEvent::ContentSkipped(e) => vec![format!("skipped: {e}")],
        ProcessEvent::EnlargementRejected(e) => vec![
            format!("skipped: {e}"),
            format!("{}for: {}", indent(1), e.dependents.join(", ")),
        ],
        ProcessEvent::ForcedMagnification(w) => vec![format!("warning: {w}")],
        ProcessEvent::Generated { key, seed, status } => vec![format!(
            "{}: {} (seed {seed})",
            file_name(key),
            status_label(status, "generated")
        )],
        ProcessEvent::MethodStarted { method, tasks } => {
            vec![format!("{method} ({tasks} tasks)")]
        }
        ProcessEvent::Enlarged {
            key,
            dependents,
            status,
        } => {
            let mut lines = vec![format!(
                "{}{}: {}",
                indent(1),
                file_name(key),
                status_label(status, "enlarged")
            )];
            if !dependents.is_empty() {
                lines.push(format!("{}for: {}", indent(2), dependents.join(", ")));
            }
            lines
        }
        ProcessEvent::Finalized { key, status } => vec![format!(
            "{}: {}",
            file_name(key),
            status_label(status, "written")
        )],
        ProcessEvent::Swept { content, removed } => {
            vec![format!("{content}: removed {removed} intermediates")]
        }
    }
}

// ============================================================================
// Status
// ============================================================================

pub fn format_status(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        "Output directory".to_string(),
        format!("{}bases: {}", indent(1), report.bases),
        format!("{}enlargements: {}", indent(1), report.enlarged),
        format!("{}finals: {}", indent(1), report.finals),
    ];

    let ids: Vec<String> = report.content_ids.iter().map(|c| c.to_string()).collect();
    if ids.is_empty() {
        lines.push("Content ids: none".to_string());
    } else {
        lines.push(format!("Content ids: {}", ids.join(", ")));
    }

    let plan = &report.plan;
    if plan.is_complete() {
        lines.push("Pending: nothing".to_string());
    } else {
        lines.push("Pending".to_string());
        for task in plan.pending_tasks() {
            lines.push(format!("{}{}", indent(1), file_name(&task.key())));
        }
        for job in plan.pending_finals() {
            lines.push(format!("{}{}", indent(1), file_name(&job.key())));
        }
    }

    if !plan.missing_bases.is_empty() {
        lines.push("Missing base images".to_string());
        for missing in &plan.missing_bases {
            lines.push(format!("{}{}", indent(1), missing));
        }
    }
    if !plan.invalid_tasks.is_empty() {
        lines.push("Rejected enlargements".to_string());
        for invalid in &plan.invalid_tasks {
            lines.push(format!("{}{}", indent(1), invalid));
        }
    }
    if !report.missing_buckets.is_empty() {
        lines.push("Skipped devices".to_string());
        for missing in &report.missing_buckets {
            lines.push(format!("{}{}", indent(1), missing));
        }
    }
    lines
}

pub fn print_status(report: &StatusReport) {
    for line in format_status(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Closing lines of a run: cache statistics, then every failure.
pub fn format_summary(report: &ProcessReport) -> Vec<String> {
    let mut lines = vec![format!("Cache: {}", report.stats)];

    let mut failures: Vec<String> = Vec::new();
    if let Some(generation) = &report.generation {
        failures.extend(generation.failures.iter().map(|f| f.to_string()));
    }
    failures.extend(report.dispatch.failures.iter().map(|f| f.to_string()));
    failures.extend(report.finalize.failures.iter().map(|f| f.to_string()));
    if !failures.is_empty() {
        lines.push(format!("Failures ({}), retried on the next run", failures.len()));
        lines.extend(failures.into_iter().map(|f| format!("{}{f}", indent(1))));
    }

    if !report.missing_bases.is_empty() {
        lines.push(format!(
            "Missing base images: {}",
            report.missing_bases.len()
        ));
    }
    if !report.invalid_tasks.is_empty() {
        lines.push(format!(
            "Rejected enlargements: {}",
            report.invalid_tasks.len()
        ));
    }
    if !report.swept.is_empty() {
        lines.push(format!("Removed {} intermediates", report.swept.len()));
    }
    lines
}

pub fn print_summary(report: &ProcessReport) {
    for line in format_summary(report) {
        println!("{}", line);
    }
}
