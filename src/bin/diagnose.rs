//! Diagnostic tool - Check configuration readiness
//!
//! Run with: cargo run --bin diagnose

use std::env;

fn main() {
    println!("🔍 CURVE ADVISOR DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("FEED_MODE", "pull", "Light (pull) or full (push) node"),
        ("FEED_REFRESH_INTERVAL_SECS", "120", "Background feed pull period"),
        ("DEBOUNCE_MS", "1000", "Quiet window before tips are recomputed"),
        ("TIP_INTERVAL_SECS", "60", "Periodic tip recomputation (0 = off)"),
        ("REQUEST_TIMEOUT_SECS", "10", "Ledger request timeout"),
        ("BASE_ASSET_SYMBOL", "GBYTE", "Symbol of the base asset"),
        ("TIP_LOG", "true", "Log emitted tips?"),
        ("TIP_LOG_PATH", "./logs/tips.log", "Tip log file"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    let ledger = env::var("LEDGER_URL").unwrap_or_else(|_| "http://127.0.0.1:6611 (default)".to_string());
    println!("  LEDGER_URL: {}", ledger);

    println!("\n═══════════════════════════════════════════════════");
    println!("                    TEMPLATES                       ");
    println!("═══════════════════════════════════════════════════\n");

    let count = |key: &str| {
        env::var(key)
            .map(|s| s.split(',').filter(|t| !t.trim().is_empty()).count())
            .unwrap_or(0)
    };
    let is_set = |key: &str| env::var(key).map(|s| !s.trim().is_empty()).unwrap_or(false);

    let curves = count("CURVE_TEMPLATES");
    println!("  CURVE_TEMPLATES:       {}", if curves > 0 { format!("✅ {}", curves) } else { "❌ Not set".to_string() });
    println!("  GOVERNANCE_TEMPLATES:  {}", count("GOVERNANCE_TEMPLATES"));
    println!("  DEPOSIT_TEMPLATE:      {}", if is_set("DEPOSIT_TEMPLATE") { "✅ Set" } else { "○ Not set" });
    println!("  BUFFER_TEMPLATE:       {}", if is_set("BUFFER_TEMPLATE") { "✅ Set" } else { "○ Not set" });
    println!("  ARB_TEMPLATES:         {}", count("ARB_TEMPLATES"));
    println!("  TOKEN_REGISTRY_AGENT:  {}", if is_set("TOKEN_REGISTRY_AGENT") { "✅ Set" } else { "○ Not set" });

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    let mode = env::var("FEED_MODE").unwrap_or_else(|_| "pull".to_string());
    match mode.to_lowercase().as_str() {
        "push" | "full" => {
            println!("  📡 PUSH MODE (full node)");
            println!("     → Feeds arrive with the ledger");
            println!("     → No refresh timers, no hub requests");
        }
        _ => {
            println!("  🔄 PULL MODE (light node)");
            println!("     → Feeds are pulled before every assessment");
            println!("     → One refresh timer per monitored curve");
        }
    }

    if curves == 0 {
        println!("\n  ⚠️  WARNING: No curve templates configured!");
        println!("     The advisor will refuse to start.");
    }
    if !is_set("TOKEN_REGISTRY_AGENT") {
        println!("\n  ℹ️  Without a token registry, tips show raw asset ids.");
    }

    println!("\n✅ Diagnostic complete!\n");
}
