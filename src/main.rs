//! tab-probe
//!
//! Diagnostics for the typed array bridge: checks an engine library for the
//! entry points the bridge needs, prints the type tag table, and runs a
//! conversion self-test against the simulated engine.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use typed_array_bridge::config::BridgeConfig;
use typed_array_bridge::ffi::{JscLibrary, SimEngine, DEFAULT_LIBRARY_CANDIDATES};
use typed_array_bridge::tag::{ElementType, Float32Array, Int32Array, ALL_ELEMENT_TYPES};
use typed_array_bridge::{CreateStrategy, EngineRuntime, TypedArrayBridge, RUNTIME_LAYOUT_VERSION};

#[derive(Parser)]
#[command(name = "tab-probe")]
#[command(version)]
#[command(about = "Typed array bridge diagnostics", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check an engine library for the required symbols
    Symbols {
        /// Library path (overrides config)
        #[arg(long)]
        library: Option<PathBuf>,

        /// Config file (default: search upward for typed-array-bridge.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the element type table
    Types,

    /// Run create/read/update/detect against the simulated engine
    Selftest {
        /// Construction strategy
        #[arg(long, value_enum, default_value_t = CreateStrategy::NoCopy)]
        strategy: CreateStrategy,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Symbols { library, config } => cmd_symbols(library, config),
        Commands::Types => {
            cmd_types();
            Ok(())
        }
        Commands::Selftest { strategy } => cmd_selftest(strategy),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            BridgeConfig::find_and_load(&cwd).context("Failed to load config")
        }
    }
}

fn cmd_symbols(library: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config)?;
    if library.is_some() {
        config.engine.library = library;
    }

    let lib = JscLibrary::open_default(&config).with_context(|| {
        format!(
            "No usable engine library (platform defaults: {})",
            DEFAULT_LIBRARY_CANDIDATES.join(", ")
        )
    })?;
    println!("Engine library: {}", lib.path().display());
    println!("Runtime layout: v{}", RUNTIME_LAYOUT_VERSION);

    let report = JscLibrary::probe(lib.path())?;
    for (name, found) in &report {
        println!("  {:<42} {}", name, if *found { "ok" } else { "MISSING" });
    }
    Ok(())
}

fn cmd_types() {
    println!("{:<20} {:>9} {:>6}", "element type", "engine id", "width");
    for ty in ALL_ELEMENT_TYPES {
        println!(
            "{:<20} {:>9} {:>6}",
            ty.to_string(),
            ty.engine_type().raw(),
            ty.element_size()
        );
    }
}

fn cmd_selftest(strategy: CreateStrategy) -> Result<()> {
    let sim = Arc::new(SimEngine::new());
    let runtime = EngineRuntime::new(sim.create_context());
    let bridge = TypedArrayBridge::new(sim.clone()).with_strategy(strategy);
    let rt = runtime.as_host();

    let value = bridge.create::<Int32Array>(rt, &[1, 2, 3])?;
    let read = bridge.from_value::<Int32Array>(rt, &value)?;
    check("create/read Int32Array", read == [1, 2, 3])?;

    bridge.update_with_data(rt, &value, &9i32.to_ne_bytes())?;
    let read = bridge.from_value::<Int32Array>(rt, &value)?;
    check("update_with_data partial overwrite", read == [9, 2, 3])?;

    let empty = bridge.create::<Float32Array>(rt, &[])?;
    check(
        "empty Float32Array detect",
        bridge.type_from_value(rt, &empty) == ElementType::Float32Array,
    )?;
    check(
        "empty Float32Array read",
        bridge.from_value::<Float32Array>(rt, &empty)?.is_empty(),
    )?;

    let too_big = bridge.update_with_data(rt, &value, &[0u8; 16]);
    check("oversized update rejected", too_big.is_err())?;

    drop(value);
    drop(empty);
    runtime.teardown();
    let stats = sim.stats();
    check(
        "one release per handle",
        stats.protect_calls == stats.unprotect_calls && stats.invalid_calls == 0,
    )?;

    println!("selftest passed ({} engine objects created)", stats.objects_created);
    Ok(())
}

fn check(name: &str, ok: bool) -> Result<()> {
    println!("  {:<40} {}", name, if ok { "ok" } else { "FAILED" });
    if !ok {
        bail!("selftest failed: {}", name);
    }
    Ok(())
}
