use std::time::Duration;

use clap::Args;
use focusguard_core::{evaluate, AppId, DisciplineSettings, DistractingApps};

#[derive(Args)]
pub struct EvaluateArgs {
    /// Distracting time used today, in minutes
    #[arg(long, default_value_t = 0.0)]
    cumulative_min: f64,
    /// Daily limit in minutes
    #[arg(long, default_value_t = 30)]
    limit_min: u32,
    /// Tasks are complete (suppresses blocking)
    #[arg(long)]
    tasks_complete: bool,
    /// Track only; never block
    #[arg(long)]
    no_block: bool,
    /// Discipline switched off
    #[arg(long)]
    inactive: bool,
    /// Foreground app id
    #[arg(long)]
    foreground: Option<String>,
    /// Distracting app ids, comma-separated
    #[arg(long, value_delimiter = ',')]
    apps: Vec<String>,
}

pub fn run(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.cumulative_min.is_finite() || args.cumulative_min < 0.0 {
        return Err(format!("invalid --cumulative-min: {}", args.cumulative_min).into());
    }
    let settings = DisciplineSettings {
        active: !args.inactive,
        block_on_limit: !args.no_block,
        daily_limit: Duration::from_secs(u64::from(args.limit_min) * 60),
        distracting_apps: DistractingApps::new(&args.apps),
        tasks_complete: args.tasks_complete,
    };
    let cumulative = Duration::from_secs_f64(args.cumulative_min * 60.0);
    let foreground = args.foreground.map(AppId::new);
    let verdict = evaluate(&settings, cumulative, foreground.as_ref());
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
