//! `avm run`

use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{anyhow, bail, Context, Result};
use avm_vm::config::ActorConfig;
use avm_vm::{HostArg, Loader, RunState, Scheduler, SchedulerConfig};
use tracing::{error, info};

pub struct RunOptions {
    pub chunks: Vec<PathBuf>,
    pub entry: String,
    pub idx_bits: u8,
    pub gen_bits: u8,
    pub max_heap: usize,
    pub args: Vec<String>,
}

/// Splits `module:name`.
pub fn parse_entry(entry: &str) -> Result<(&str, &str)> {
    match entry.split_once(':') {
        Some((module, name)) if !module.is_empty() && !name.is_empty() => Ok((module, name)),
        _ => bail!("invalid entry {entry:?}: expected <module>:<name>"),
    }
}

pub fn run(opts: RunOptions) -> Result<()> {
    let (module, name) = parse_entry(&opts.entry)?;

    let mut loader = Loader::default();
    for path in &opts.chunks {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        loader
            .load(&bytes)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    let defaults = ActorConfig::default();
    let config = SchedulerConfig {
        idx_bits: opts.idx_bits,
        gen_bits: opts.gen_bits,
        actor: ActorConfig {
            initial_heap: defaults.initial_heap.min(opts.max_heap),
            max_heap: opts.max_heap,
            ..defaults
        },
    };
    let mut scheduler = Scheduler::new(config, loader)?;

    let panics = Rc::new(Cell::new(0usize));
    let counter = panics.clone();
    scheduler.on_panic(move |pid, err| {
        error!(%pid, code = err.code(), error = %err, "process panicked");
        counter.set(counter.get() + 1);
    });

    let args: Vec<HostArg<'_>> = opts.args.iter().map(|s| HostArg::from(s.as_str())).collect();
    let pid = scheduler
        .spawn_export(module, name, &args)
        .map_err(|e| anyhow!("cannot start {module}:{name}: {e}"))?;
    info!(%pid, entry = %opts.entry, "entry spawned");

    if let RunState::Idle { .. } = scheduler.run() {
        bail!(
            "{} process(es) blocked with nothing left to wake them",
            scheduler.process_count()
        );
    }
    if panics.get() > 0 {
        bail!("{} process(es) panicked", panics.get());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        assert_eq!(parse_entry("main:start").unwrap(), ("main", "start"));
        assert_eq!(parse_entry("a:b:c").unwrap(), ("a", "b:c"));
        assert!(parse_entry("main").is_err());
        assert!(parse_entry(":start").is_err());
        assert!(parse_entry("main:").is_err());
    }
}
