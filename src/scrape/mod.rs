use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;

use crate::config::ScrapeConfig;
use crate::output::types::Meta;
use crate::telemetry::{self};
use crate::telemetry::ops::scrape::Phase as ScrapePhase;
use crate::util::time::date_range;

pub mod batch;
pub mod classify;
pub mod fetch;
pub mod filter;
pub mod parse;
pub mod signature;
pub mod types;
mod write;

use self::batch::{ScrapeJob, Scraper};
use self::fetch::{HttpSource, ScheduleRequest};
use self::filter::SearchTerm;

#[derive(Args)]
pub struct ScrapeCmd {
    /// Channel id as the endpoint knows it, e.g. `btv1`
    #[arg(long)] pub channel: String,
    /// First date, YYYY-MM-DD
    #[arg(long)] pub from: String,
    /// Last date (inclusive); defaults to --from
    #[arg(long)] pub to: Option<String>,
    /// Case-insensitive term matched against title, link text and link title
    #[arg(long)] pub search: Option<String>,
    /// Session cookie value; overrides TVP_LOGIN and the credential file
    #[arg(long)] pub cookie: Option<String>,
    #[arg(long)] pub out: Option<PathBuf>,
    #[arg(long, default_value_t=false)] pub apply: bool,
    #[arg(long, default_value_t=10)] pub plan_limit: usize,
}

pub async fn run(args: ScrapeCmd) -> Result<()> {
    let log = telemetry::scrape();
    let _g = log.root_span_kv([
        ("channel", args.channel.clone()),
        ("from", args.from.clone()),
        ("to", format!("{:?}", args.to)),
        ("search", format!("{:?}", args.search)),
        ("apply", args.apply.to_string()),
    ]).entered();

    // bad dates abort before any network activity
    let dates = date_range(&args.from, args.to.as_deref())?;
    let (first, last) = (dates[0], dates[dates.len() - 1]);
    let out = args.out.clone().unwrap_or_else(|| PathBuf::from(format!("{}_{}_{}.txt", args.channel, first, last)));
    let cfg = ScrapeConfig::from_env(args.cookie.clone())?;

    if !args.apply {
        let _sp = log.span(&ScrapePhase::Plan).entered();
        if telemetry::config::json_mode() {
            use types::{RequestSample, ScrapePlan};
            let mut samples = Vec::new();
            for d in dates.iter().take(args.plan_limit) {
                let req = ScheduleRequest::new(d.to_string(), args.channel.as_str());
                samples.push(RequestSample { date: *d, url: req.url(&cfg.endpoint)?.to_string() });
            }
            let plan = ScrapePlan {
                channel: args.channel.clone(),
                from: first,
                to: last,
                dates: dates.len(),
                search: args.search.clone(),
                out: out.display().to_string(),
                cookie: cfg.cookie.is_some(),
                sample_requests: samples,
            };
            log.plan(&plan)?;
        } else {
            log.info(format!("📝 Scrape plan — channel={} dates={} ({}..={}) search={:?} cookie={} out={}",
                args.channel, dates.len(), first, last, args.search, cfg.cookie.is_some(), out.display()));
            for d in dates.iter().take(args.plan_limit) {
                let req = ScheduleRequest::new(d.to_string(), args.channel.as_str());
                log.info(format!("  {} {}", d, req.url(&cfg.endpoint)?));
            }
            if dates.len() > args.plan_limit { log.info(format!("  ... ({} more)", dates.len() - args.plan_limit)); }
            log.info("   Use --apply to execute.");
        }
        return Ok(());
    }

    let t0 = Instant::now();
    let source = HttpSource::new(&cfg)?;
    let scraper = Scraper::new(source);
    let job = ScrapeJob {
        dates,
        channel: args.channel.clone(),
        term: SearchTerm::new(args.search.as_deref()),
    };
    let report = scraper.run(&job).await;

    let written = {
        let _s = log.span_kv(&ScrapePhase::Write, [("out", out.display().to_string())]).entered();
        write::write_schedule(&out, &report.rows)?
    };
    log.info(format!("💾 Wrote {} lines to {}", written, out.display()));
    if !report.dropped.is_empty() {
        let dropped: Vec<String> = report.dropped.iter().map(|d| d.to_string()).collect();
        log.warn_kv(&format!("↩️ {} dates without data: {}", dropped.len(), dropped.join(", ")), [("dropped", dropped.len().to_string())]);
    }
    log.totals(report.requested.len(), report.processed.len(), report.dropped.len(), written);

    if telemetry::config::json_mode() {
        use types::ScrapeResult;
        let result = ScrapeResult {
            status: report.status,
            rounds: report.rounds.len(),
            retried: report.rounds.iter().skip(1).map(|r| r.pending.len()).sum(),
            requested: report.requested.len(),
            processed: report.processed.len(),
            dropped: report.dropped.clone(),
            rows: written,
            out: out.display().to_string(),
        };
        let meta = Meta { duration_ms: Some(t0.elapsed().as_millis()), rounds: Some(report.rounds.len()) };
        log.result(&result, Some(meta))?;
    }
    Ok(())
}
