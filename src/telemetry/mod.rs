pub mod config;
pub mod ctx;
pub mod ops;

use ctx::LogCtx;

pub fn scrape() -> LogCtx<ops::scrape::Scrape> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn sign() -> LogCtx<ops::sign::Sign> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
