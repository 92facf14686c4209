//! Tether Runtime
//!
//! Boots the built-in host classes, publishes them to script and runs the
//! given script files.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;
use tether_core::builtin::builtin_classes;
use tether_core::ObjectDb;
use tether_script::Bridge;
use tether_services::Settings;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "tether", version, about = "Run scripts against the Tether host object model")]
struct Cli {
    /// Script files, evaluated in order
    scripts: Vec<PathBuf>,

    /// Settings file (JSON)
    #[arg(long, default_value = "tether.json")]
    settings: PathBuf,

    /// Script class to instantiate after the scripts ran; its `_ready` is
    /// called when defined
    #[arg(long)]
    instantiate: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.settings)?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&settings.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Tether v{}", tether_core::VERSION);

    let objects = Rc::new(ObjectDb::new());
    let classes = Rc::new(builtin_classes(&objects)?);
    let bridge = Bridge::initialize(Rc::clone(&objects), classes, settings.script)?;

    for script in &cli.scripts {
        let source = std::fs::read_to_string(script).with_context(|| format!("failed to read {}", script.display()))?;
        bridge
            .eval_string(&source)
            .with_context(|| format!("script {} failed", script.display()))?;
        tracing::debug!(script = %script.display(), "script evaluated");
    }

    if let Some(class_name) = &cli.instantiate {
        instantiate(&bridge, class_name)?;
    }

    bridge.collect_garbage();
    bridge.log_stats();
    bridge.uninitialize();
    tracing::info!(objects = objects.len(), "shut down");

    Ok(())
}

fn instantiate(bridge: &Bridge, class_name: &str) -> Result<()> {
    let id = bridge.with(|ctx| -> Result<_> {
        let instance = bridge.create_instance(&ctx, class_name, None)?;
        bridge
            .unwrap(&ctx, instance.as_value())
            .context("script instance has no host object")
    })?;

    let has_ready = bridge
        .script_class(class_name)
        .is_some_and(|record| record.methods.iter().any(|method| method == "_ready"));
    if has_ready {
        bridge
            .invoke_script_method(id, "_ready", &[])
            .with_context(|| format!("{class_name}._ready failed"))?;
    }
    tracing::info!(class_name, %id, "script instance ready");
    Ok(())
}
