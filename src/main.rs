//! `headstack`: resolve a head file and print the server-rendered fragments,
//! or splice them into an HTML template.

mod config;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use core_types::RenderSide;
use head::{inject_head, outline_resolved, render_ssr_head};
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Side {
    Server,
    Client,
}

impl From<Side> for RenderSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Server => RenderSide::Server,
            Side::Client => RenderSide::Client,
        }
    }
}

#[derive(Parser)]
#[command(name = "headstack")]
#[command(about = "Resolve declarative head entries into HTML")]
struct Args {
    /// TOML head file with `[options]` and `[[entry]]` tables
    entries: PathBuf,

    /// HTML template to inject the rendered fragments into
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Override the render side from the head file
    #[arg(long, value_enum)]
    side: Option<Side>,

    /// Stamp hydration markers on rendered tags
    #[arg(long)]
    markers: bool,

    /// Join tags without line breaks
    #[arg(long)]
    compact: bool,

    /// Print a resolved-tag outline to stderr
    #[arg(long)]
    outline: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut manifest = config::load_manifest(&args.entries)
        .with_context(|| format!("loading {}", args.entries.display()))?;
    if let Some(side) = args.side {
        manifest.options.side = side.into();
    }
    manifest.options.ssr.hydration_markers |= args.markers;
    manifest.options.ssr.omit_line_breaks |= args.compact;

    let (head, ids) = manifest.into_head();
    log::info!(target: "headstack", "pushed {} entries ({:?})", ids.len(), head.side());

    let resolved = head.resolve();
    if args.outline {
        for line in outline_resolved(&resolved, 64) {
            eprintln!("{line}");
        }
    }
    if !resolved.diagnostics.is_empty() {
        log::warn!(
            target: "headstack",
            "{} tags were dropped as malformed",
            resolved.diagnostics.len()
        );
    }

    let ssr = render_ssr_head(&head);
    match &args.template {
        Some(path) => {
            let template = config::load_template(path)
                .with_context(|| format!("loading template {}", path.display()))?;
            print!("{}", inject_head(&template, &ssr));
        }
        None => {
            for (label, fragment) in [
                ("html attrs", &ssr.html_attrs),
                ("head", &ssr.head_tags),
                ("body attrs", &ssr.body_attrs),
                ("body open", &ssr.body_tags_open),
                ("body close", &ssr.body_tags),
            ] {
                if !fragment.is_empty() {
                    println!("<!-- {label} -->\n{}", fragment.trim_start());
                }
            }
        }
    }
    Ok(())
}
