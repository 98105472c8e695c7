use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::config::ScrapeConfig;
use crate::scrape::fetch::ScheduleRequest;
use crate::scrape::signature::RequestSignature;
use crate::telemetry::{self};
use crate::telemetry::ops::sign::Phase as SignPhase;
use crate::util::time::parse_date;

/// Print the request signature and URL for one date.
#[derive(Args)]
pub struct SignCmd {
    #[arg(long)] pub channel: String,
    /// YYYY-MM-DD
    #[arg(long)] pub date: String,
}

#[derive(Serialize)]
struct SignResult {
    signature: RequestSignature,
    callback: String,
    url: String,
}

pub async fn run(args: SignCmd) -> Result<()> {
    let log = telemetry::sign();
    let _g = log.root_span_kv([("channel", args.channel.clone()), ("date", args.date.clone())]).entered();

    let date = parse_date(&args.date)?;
    let cfg = ScrapeConfig::from_env(None)?;

    let _s = log.span(&SignPhase::Compute).entered();
    let req = ScheduleRequest::new(date.to_string(), args.channel.as_str());
    let url = req.url(&cfg.endpoint)?.to_string();

    if telemetry::config::json_mode() {
        let result = SignResult { callback: req.signature.callback(), signature: req.signature, url };
        log.result(&result, None)?;
    } else {
        log.info(format!("🔑 {} {} → {}={} callback={}", args.channel, date, req.signature.code_name, req.signature.code, req.signature.callback()));
        log.info(format!("   {url}"));
    }
    Ok(())
}
