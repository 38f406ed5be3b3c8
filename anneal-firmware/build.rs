//! Build script for anneal-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates process.toml at compile time

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stages a recipe may hold
const MAX_STAGES: usize = 8;

/// Furnace program segments stop at 99 h 59 min
const MAX_STAGE_MINUTES: i64 = 99 * 60 + 59;

/// UP150 setpoint ceiling in °C
const FURNACE_CEILING_C: f64 = 1200.0;

fn main() {
    setup_linker();
    validate_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate process.toml at compile time
fn validate_config() {
    println!("cargo:rerun-if-changed=process.toml");

    let config_path = Path::new("process.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: process.toml not found!                                  ║\n\
            ║                                                                  ║\n\
            ║  The firmware embeds a process.toml configuration file.          ║\n\
            ║  Please create one in the anneal-firmware directory.             ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read process.toml                              ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in process.toml                      ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let (ambient_c, max_temp_c) = validate_process(&config);
    validate_retry(&config);
    validate_serial(&config, "furnace", "station", 1, 99);
    validate_serial(&config, "flow", "channel", 1, 8);
    validate_stages(&config, ambient_c, max_temp_c);

    println!("cargo:warning=process.toml validated successfully");
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Abort the build listing every problem found in one section
fn report(title: &str, errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        errors
            .iter()
            .map(|e| format!("║  • {:<62} ║", e))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

/// Integer or float as f64
fn number(value: Option<&toml::Value>) -> Option<f64> {
    match value {
        Some(toml::Value::Integer(i)) => Some(*i as f64),
        Some(toml::Value::Float(f)) => Some(*f),
        _ => None,
    }
}

/// Validate the [process] section, returning the temperature window
fn validate_process(config: &toml::Value) -> (f64, f64) {
    let mut errors = Vec::new();

    let Some(process) = config.get("process").and_then(|p| p.as_table()) else {
        report(
            "Missing [process] section",
            &["[process] holds the required process settings".to_string()],
        );
        return (0.0, 0.0);
    };

    // No defaults exist for these two
    for key in ["ramp_tolerance_c", "purge_flow_sccm"] {
        if process.get(key).is_none() {
            errors.push(format!("[process] missing required '{}'", key));
        }
    }

    let ambient_c = number(process.get("ambient_c")).unwrap_or(25.0);
    let max_temp_c = number(process.get("max_temp_c")).unwrap_or(FURNACE_CEILING_C);

    if !(0.0..FURNACE_CEILING_C).contains(&ambient_c) {
        errors.push("[process] ambient_c must be 0-1200".to_string());
    }
    if max_temp_c > FURNACE_CEILING_C || max_temp_c <= ambient_c {
        errors.push("[process] max_temp_c must be above ambient and <= 1200".to_string());
    }
    if let Some(threshold) = number(process.get("shutdown_threshold_c")) {
        if threshold < ambient_c || threshold > max_temp_c {
            errors.push("[process] shutdown_threshold_c must be ambient-max".to_string());
        }
    }
    if let Some(tolerance) = number(process.get("ramp_tolerance_c")) {
        if tolerance <= 0.0 {
            errors.push("[process] ramp_tolerance_c must be positive".to_string());
        }
    }
    if let Some(purge) = number(process.get("purge_flow_sccm")) {
        if purge <= 0.0 {
            errors.push("[process] purge_flow_sccm must be positive".to_string());
        }
    }
    if let Some(toml::Value::Integer(interval)) = process.get("sample_interval_ms") {
        if *interval < 100 || *interval > 3_600_000 {
            errors.push("[process] sample_interval_ms must be 100-3600000".to_string());
        }
    }

    report("Invalid process configuration", &errors);
    (ambient_c, max_temp_c)
}

/// Validate the optional [retry] section
fn validate_retry(config: &toml::Value) {
    let Some(retry) = config.get("retry").and_then(|r| r.as_table()) else {
        return;
    };
    let mut errors = Vec::new();

    if let Some(toml::Value::Integer(attempts)) = retry.get("max_attempts") {
        if *attempts < 1 || *attempts > 10 {
            errors.push("[retry] max_attempts must be 1-10".to_string());
        }
    }
    for key in ["backoff_ms", "max_backoff_ms"] {
        if let Some(toml::Value::Integer(ms)) = retry.get(key) {
            if *ms < 0 || *ms > 60_000 {
                errors.push(format!("[retry] {} must be 0-60000", key));
            }
        }
    }

    report("Invalid retry configuration", &errors);
}

/// Validate one instrument's serial section
fn validate_serial(config: &toml::Value, section: &str, address_key: &str, min: i64, max: i64) {
    let Some(table) = config.get(section).and_then(|s| s.as_table()) else {
        return;
    };
    let mut errors = Vec::new();

    if let Some(toml::Value::Integer(baud)) = table.get("baud") {
        if ![1200, 2400, 4800, 9600, 19200, 38400].contains(baud) {
            errors.push(format!("[{}] unsupported baud rate {}", section, baud));
        }
    }
    if let Some(toml::Value::Integer(bits)) = table.get("data_bits") {
        if *bits != 7 && *bits != 8 {
            errors.push(format!("[{}] data_bits must be 7 or 8", section));
        }
    }
    if let Some(toml::Value::Integer(bits)) = table.get("stop_bits") {
        if *bits != 1 && *bits != 2 {
            errors.push(format!("[{}] stop_bits must be 1 or 2", section));
        }
    }
    if let Some(toml::Value::String(parity)) = table.get("parity") {
        if !["none", "even", "odd"].contains(&parity.as_str()) {
            errors.push(format!(
                "[{}] parity must be 'none', 'even', or 'odd'",
                section
            ));
        }
    }
    if let Some(toml::Value::Integer(address)) = table.get(address_key) {
        if *address < min || *address > max {
            errors.push(format!(
                "[{}] {} must be {}-{}",
                section, address_key, min, max
            ));
        }
    }
    for key in ["range", "purge_range"] {
        if let Some(toml::Value::Integer(code)) = table.get(key) {
            if *code < 0 || *code > 39 {
                errors.push(format!("[{}] {} must be a range code 0-39", section, key));
            }
        }
    }

    report(&format!("Invalid {} configuration", section), &errors);
}

/// Validate the default recipe in [stage.N] sections
fn validate_stages(config: &toml::Value, ambient_c: f64, max_temp_c: f64) {
    let Some(stages) = config.get("stage").and_then(|s| s.as_table()) else {
        return;
    };
    let mut errors = Vec::new();

    if stages.len() > MAX_STAGES {
        errors.push(format!("at most {} [stage.N] sections allowed", MAX_STAGES));
    }

    let mut indices = Vec::new();
    for (name, stage) in stages {
        match name.parse::<usize>() {
            Ok(i) if i < MAX_STAGES => indices.push(i),
            _ => errors.push(format!("[stage.{}] index must be 0-{}", name, MAX_STAGES - 1)),
        }

        let Some(stage) = stage.as_table() else {
            errors.push(format!("[stage.{}] must be a table", name));
            continue;
        };

        match number(stage.get("target_c")) {
            Some(t) if t < ambient_c || t > max_temp_c => {
                errors.push(format!("[stage.{}] target_c must be ambient-max_temp_c", name))
            }
            Some(_) => {}
            None => errors.push(format!("[stage.{}] missing 'target_c'", name)),
        }
        for key in ["ramp_min", "hold_min"] {
            match stage.get(key) {
                Some(toml::Value::Integer(m)) if *m < 0 || *m > MAX_STAGE_MINUTES => {
                    errors.push(format!("[stage.{}] {} must be 0-{}", name, key, MAX_STAGE_MINUTES))
                }
                Some(toml::Value::Integer(_)) => {}
                Some(_) => errors.push(format!("[stage.{}] {} must be an integer", name, key)),
                None => errors.push(format!("[stage.{}] missing '{}'", name, key)),
            }
        }
        match number(stage.get("flow_sccm")) {
            Some(f) if f < 0.0 => {
                errors.push(format!("[stage.{}] flow_sccm must not be negative", name))
            }
            Some(_) => {}
            None => errors.push(format!("[stage.{}] missing 'flow_sccm'", name)),
        }
    }

    // Stages run in index order and may not leave gaps
    indices.sort_unstable();
    for (expected, index) in indices.iter().enumerate() {
        if *index != expected {
            errors.push(format!("[stage.{}] missing, stages must start at 0", expected));
            break;
        }
    }

    report("Invalid stage configuration", &errors);
}
