//! `cph doctor`: read-only environment and tool availability check, grounded
//! on `doctor::run_doctor`'s section-header layout generalized from CSA's
//! fixed 4-tool list to the languages configured in this workspace's graph.

use cph_core::CphError;
use sysinfo::System;

use crate::context::Session;

pub fn run(session: &Session) -> Result<(), CphError> {
    println!("=== cph Environment Check ===");
    print_platform_info();
    print_workspace(session);
    println!();

    println!("=== Language Toolchains ===");
    print_language_toolchains(session);
    println!();

    println!("=== Container Runtime ===");
    print_container_runtime(session);
    println!();

    println!("=== State Store ===");
    print_state_store(session);
    println!();

    println!("=== Resource Status ===");
    print_resource_status();

    Ok(())
}

fn print_platform_info() {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("Platform: {os} {arch}");
    println!("Version:  {}", env!("CARGO_PKG_VERSION"));
}

fn print_workspace(session: &Session) {
    println!("Workspace: {}", session.workspace_root.display());
}

fn check_binary(binary: &str) -> Option<String> {
    which::which(binary).ok()?;
    let output = std::process::Command::new(binary).arg("--version").output().ok()?;
    if !output.status.success() {
        return Some("installed (version unknown)".to_string());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().next().map(|s| format!("installed ({})", s.trim()))
}

fn print_tool_line(label: &str, binary: &str) {
    match check_binary(binary) {
        Some(status) => println!("{label:<12} ✓ {status}"),
        None => println!("{label:<12} ✗ not found on PATH ({binary})"),
    }
}

fn print_language_toolchains(session: &Session) {
    let languages = session.graph.children("languages").unwrap_or_default();
    if languages.is_empty() {
        println!("(no languages configured)");
        return;
    }
    for language in languages {
        let toolchain = session
            .graph
            .resolve_string(&format!("languages.{language}.toolchain_binary"))
            .unwrap_or_else(|_| language.clone());
        print_tool_line(&language, &toolchain);
    }
}

fn print_container_runtime(session: &Session) {
    let binary = session
        .graph
        .resolve_string("executor.container_binary")
        .unwrap_or_else(|_| "docker".to_string());
    print_tool_line("container", &binary);
}

fn print_state_store(session: &Session) {
    match session.store.query_operations(1) {
        Ok(_) => println!("History DB: ✓ opened and migrated"),
        Err(e) => println!("History DB: ✗ {e}"),
    }
}

fn print_resource_status() {
    let mut sys = System::new_all();
    sys.refresh_memory();
    println!("Free Memory: {}", format_bytes(sys.available_memory()));
    println!("Free Swap:   {}", format_bytes(sys.free_swap()));
}

fn format_bytes(bytes: u64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    format!("{:.2} GB", bytes as f64 / GB)
}
