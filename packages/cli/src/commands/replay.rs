use crate::script::{self, Step};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use folio_editor::{Editor, EditorConfig};
use folio_view::{Patch, RecordingRenderer};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Edit script (JSON list of steps)
    pub script: PathBuf,

    /// Directory holding folio.config.json (defaults to current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the rendered surface after every step
    #[arg(long)]
    pub html: bool,
}

/// Patches one step produced
#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: &'static str,
    pub patches: Vec<Patch>,
    pub surface: String,
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    /// Serialized data of every root, in configuration order
    pub data: Vec<(String, String)>,
}

pub fn replay(args: ReplayArgs, cwd: &str) -> Result<()> {
    let config_dir = args.config.clone().unwrap_or_else(|| PathBuf::from(cwd));
    let config = EditorConfig::load(&config_dir)?;
    if let Err(error) = crate::logging::init(&config.log_filter) {
        debug!(%error, "keeping the installed log subscriber");
    }

    let steps = script::load(&args.script)?;
    println!(
        "{} {} ({} steps)",
        "▶ Replaying".bright_blue().bold(),
        args.script.display(),
        steps.len()
    );

    let report = run(config, &steps)?;
    for (index, step) in report.steps.iter().enumerate() {
        println!(
            "  {} {} {}",
            format!("#{}", index + 1).dimmed(),
            step.name.bold(),
            format!("({} patches)", step.patches.len()).dimmed()
        );
        for patch in &step.patches {
            println!("      {}", describe(patch));
        }
        if args.html {
            println!("      {} {}", "surface:".cyan(), step.surface);
        }
    }

    println!();
    for (root, data) in &report.data {
        println!("{} {}", format!("{}:", root).green().bold(), data);
    }
    Ok(())
}

/// Replay `steps` on a fresh editor with a recording renderer
pub fn run(config: EditorConfig, steps: &[Step]) -> Result<ReplayReport> {
    let roots = config.roots.clone();
    let mut editor = Editor::new(config, RecordingRenderer::new())?;
    let mut reports = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let committed = editor.renderer().commits().len();
        step.apply(&mut editor)
            .with_context(|| format!("step #{} ({}) failed", index + 1, step.name()))?;
        let patches: Vec<Patch> = editor.renderer().commits()[committed..].concat();
        debug!(step = step.name(), patches = patches.len(), "step replayed");
        reports.push(StepReport {
            name: step.name(),
            patches,
            surface: editor.renderer().to_html(),
        });
    }

    let mut data = Vec::with_capacity(roots.len());
    for root in roots {
        let serialized = editor.get_data(&root)?;
        data.push((root, serialized));
    }
    info!(steps = reports.len(), version = editor.document().version(), "replay finished");
    Ok(ReplayReport { steps: reports, data })
}

/// One line per patch
pub fn describe(patch: &Patch) -> String {
    match patch {
        Patch::Create { parent, index, node } => {
            let parent = parent.map(|parent| parent.to_string()).unwrap_or_else(|| "surface".to_string());
            format!("{} {} under {} at {}", "+".green(), node.id(), parent, index)
        }
        Patch::Remove { node } => format!("{} {}", "-".red(), node),
        Patch::SetAttribute { node, key, value: Some(value) } => {
            format!("{} {} {}=\"{}\"", "~".yellow(), node, key, value)
        }
        Patch::SetAttribute { node, key, value: None } => format!("{} {} {} removed", "~".yellow(), node, key),
        Patch::SetText { node, text } => format!("{} {} {:?}", "~".yellow(), node, text),
    }
}
