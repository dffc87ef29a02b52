use serde::Serialize;
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use queuedeck::config::Config;
use queuedeck::domain::JobState;
use queuedeck::engine::{BullConnector, ConnectionRegistry};
use queuedeck::repo::PgDescriptorRepo;
use queuedeck::{db, telemetry, ControlPlane};

const USAGE: &str = "queuedeckctl <command>\n\
     Commands:\n\
     - describe <queue_id>\n\
     - jobs <queue_id> <state> [page] [size]\n\
     - pause <queue_id>\n\
     - resume <queue_id>\n\
     - retry-all <queue_id>\n\
     - export <queue_id> <job_id>\n\
     - dashboard\n\
     \n\
     Uses DATABASE_URL (or QUEUEDECK_DATABASE_URL).\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let cfg = Config::from_env()?;
    telemetry::init_tracing(cfg.log_json);

    let pool = db::make_pool(&cfg).await?;
    let registry = ConnectionRegistry::startup();
    let connector = BullConnector::new(
        registry.clone(),
        cfg.key_prefix.clone(),
        cfg.redis_connect_timeout,
    );
    let control = ControlPlane::new(
        Arc::new(PgDescriptorRepo::new(pool)),
        Arc::new(connector),
        cfg.dashboard_concurrency,
    );

    let result = run(&control, &args).await;
    registry.shutdown();
    result
}

async fn run(control: &ControlPlane, args: &[String]) -> anyhow::Result<()> {
    match args[1].as_str() {
        "describe" => {
            let queue_id = arg(args, 2, "describe <queue_id>")?;
            print_json(&control.describe_queue(queue_id).await?)?;
        }
        "jobs" => {
            let queue_id = arg(args, 2, "jobs <queue_id> <state> [page] [size]")?;
            let state: JobState = arg(args, 3, "jobs <queue_id> <state> [page] [size]")?.parse()?;
            let page: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(1);
            let size: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(25);

            let listed = control.list_jobs(queue_id, state, page, size).await?;
            println!("{} {} job(s), page {page}", listed.total, state.as_str());
            for job in &listed.jobs {
                println!(
                    "{}  {:<9}  attempts={}  created={}",
                    job.id,
                    state.as_str(),
                    job.attempts_made,
                    job.created_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
            println!("{} job(s) on page {page}", listed.jobs.len());
        }
        "pause" => {
            let queue_id = arg(args, 2, "pause <queue_id>")?;
            control.pause_queue(queue_id).await?;
            println!("paused {queue_id}");
        }
        "resume" => {
            let queue_id = arg(args, 2, "resume <queue_id>")?;
            control.resume_queue(queue_id).await?;
            println!("resumed {queue_id}");
        }
        "retry-all" => {
            let queue_id = arg(args, 2, "retry-all <queue_id>")?;
            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            let retried = control.retry_all_jobs(queue_id, &cancel).await?;
            println!("retried {retried} job(s)");
        }
        "export" => {
            let usage = "export <queue_id> <job_id>";
            let queue_id = arg(args, 2, usage)?;
            let job_id = arg(args, 3, usage)?;

            let export = control.export_job(queue_id, job_id).await?;
            tokio::fs::write(&export.filename, export.content).await?;
            println!("wrote {}", export.filename);
        }
        "dashboard" => {
            for dashboard in control.build_all_dashboards().await? {
                println!("== {} ==", dashboard.group.name);
                for outcome in &dashboard.queues {
                    match outcome.described() {
                        Some(q) => println!(
                            "  {:<24} {:<8} waiting={} paused={} active={} delayed={} failed={} completed={}",
                            q.descriptor.name,
                            q.status.as_str(),
                            q.job_counts.waiting,
                            q.job_counts.paused,
                            q.job_counts.active,
                            q.job_counts.delayed,
                            q.job_counts.failed,
                            q.job_counts.completed,
                        ),
                        None => println!("  {:<24} unavailable", outcome.queue_id()),
                    }
                }
            }
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn arg<'a>(args: &'a [String], index: usize, usage: &str) -> anyhow::Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("usage: queuedeckctl {usage}"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
