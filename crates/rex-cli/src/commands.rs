use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use rex_sdk::{
    BudgetStore, ContextStore, ExplorationDocument, OwnerId, PutOptions, RexConfig, Workspace,
};
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    match cli.command {
        Command::Stash(args) => runtime.block_on(cmd_stash(args, &config, cli.format)),
        Command::Summary(args) => cmd_summary(args),
        Command::Budget(args) => runtime.block_on(cmd_budget(args, cli.format)),
        Command::Config(args) => cmd_config(args, config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RexConfig> {
    match path {
        Some(path) => RexConfig::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(RexConfig::default()),
    }
}

async fn cmd_stash(args: StashArgs, config: &RexConfig, format: OutputFormat) -> anyhow::Result<()> {
    let data = std::fs::read(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let owner = OwnerId::from("rex-cli");
    let store = ContextStore::new(config.context_store_config());

    let mut opts = PutOptions::new();
    if let Some(threshold) = args.inline_threshold {
        opts = opts.with_inline_threshold(threshold);
    }
    let workspace = args.workspace.then(|| Workspace::init(owner.clone()));
    if let Some(ws) = &workspace {
        opts = opts.with_workspace(ws.clone());
    }

    let reference = store.put(data, &owner, opts).await?;
    let fetched = store.fetch(&reference).await?;
    let fingerprint = reference
        .fingerprint()
        .map(|fp| fp.to_hex())
        .unwrap_or_default();

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "tier": reference.backend(),
                "size_bytes": reference.size_bytes(),
                "fingerprint": fingerprint,
                "key": reference.key(),
                "verified": fetched.len() as u64 == reference.size_bytes(),
            }))?
        ),
        OutputFormat::Text => {
            println!("{} Stored {}", "✓".green().bold(), args.file.display());
            println!("  Tier: {}", reference.backend().to_string().cyan());
            println!("  Size: {} bytes", reference.size_bytes().to_string().bold());
            println!("  Fingerprint: {}", fingerprint.yellow());
            if let Some(key) = reference.key() {
                println!("  Key: {}", key.dimmed());
            }
            println!("  Fetch: {} ({} bytes)", "verified".green(), fetched.len());
        }
    }

    store.delete(&reference).await?;
    if let Some(ws) = workspace {
        ws.destroy().await?;
    }
    Ok(())
}

fn cmd_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.document)
        .with_context(|| format!("reading {}", args.document.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.document.display()))?;
    let doc = ExplorationDocument::from_value(value).context("not an exploration document")?;
    let summary = doc.summary(args.max_chars);
    if summary.is_empty() {
        println!("{}", "(no progress recorded)".dimmed());
    } else {
        println!("{summary}");
    }
    Ok(())
}

async fn cmd_budget(args: BudgetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let budget = Arc::new(BudgetStore::new(
        OwnerId::from("rex-cli"),
        args.max_children,
        None,
    ));
    let mut handles = Vec::new();
    for caller in 0..args.callers {
        let budget = Arc::clone(&budget);
        handles.push(tokio::spawn(async move {
            budget.reserve_children(1).await.map(|r| (caller, r.granted))
        }));
    }
    let mut grants = Vec::with_capacity(handles.len());
    for handle in handles {
        grants.push(handle.await??);
    }
    grants.sort_unstable();
    let state = budget.status()?;
    budget.destroy().await?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "grants": grants.iter().map(|(c, g)| json!({"caller": c, "granted": g})).collect::<Vec<_>>(),
                "state": state,
            }))?
        ),
        OutputFormat::Text => {
            for (caller, granted) in &grants {
                let mark = if *granted > 0 { "granted".green() } else { "denied".red() };
                println!("  caller {caller:>3}: {mark}");
            }
            let cap = state
                .children_max
                .map(|m| m.to_string())
                .unwrap_or_else(|| "unlimited".into());
            println!(
                "{} {} of {} callers granted (cap {})",
                "✓".green().bold(),
                state.children_used.to_string().bold(),
                args.callers,
                cap.cyan()
            );
        }
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs, config: RexConfig) -> anyhow::Result<()> {
    let config = match args.file {
        Some(path) => load_config(Some(&path))?,
        None => config,
    };
    print!("{}", config.to_toml_string()?);
    Ok(())
}
