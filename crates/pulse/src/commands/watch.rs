use std::sync::Arc;

use clap::ArgMatches;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use pulse_config::PulseConfig;
use pulse_core::{
    Engine, FetchError, IntervalPolicy, PollUpdate, Recovery, Request, RequestClient, Scope,
};

use super::helpers;
use crate::http::ReqwestTransport;
use crate::render;

/// How long the server may hold a long-poll request open.
const LONG_POLL_WAIT_MS: u64 = 20_000;

struct WatchOptions {
    path: String,
    long_poll: bool,
    json: bool,
}

pub(crate) fn handle_watch_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = helpers::resolve_config(matches)?;
    if let Some(interval_ms) = matches.get_one::<u64>("interval-ms") {
        config.poll.interval_ms = Some(*interval_ms);
        if let Err(e) = config.validate() {
            eprintln!("❌ Invalid --interval-ms: {}", e);
            return Err(e.into());
        }
    }

    let options = WatchOptions {
        path: matches
            .get_one::<String>("path")
            .cloned()
            .unwrap_or_else(|| "/pools/default".to_string()),
        long_poll: matches.get_flag("long-poll"),
        json: matches.get_flag("json"),
    };
    let once = matches.get_flag("once");

    info!(
        event = "cli.watch.start_started",
        path = %options.path,
        base_url = config.http.base_url(),
        long_poll = options.long_poll,
        once = once
    );

    let runtime = helpers::runtime()?;
    if once {
        runtime.block_on(fetch_once(&config, &options))
    } else {
        runtime.block_on(watch(config, options))
    }
}

fn build_transport(
    config: &PulseConfig,
) -> Result<Arc<ReqwestTransport>, Box<dyn std::error::Error>> {
    match ReqwestTransport::new(&config.http) {
        Ok(transport) => Ok(Arc::new(transport)),
        Err(e) => {
            eprintln!("❌ Failed to build HTTP client: {}", e);
            Err(e.into())
        }
    }
}

async fn fetch_once(
    config: &PulseConfig,
    options: &WatchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::from_config(config, build_transport(config)?);
    let result = engine.client().get(&options.path).await;
    engine.shutdown();

    match result {
        Ok(response) => {
            print_value(&response.body, options.json);
            info!(event = "cli.watch.once_completed", status = response.status);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Failed to fetch '{}': {}", options.path, e);
            error!(
                event = "cli.watch.once_failed",
                path = %options.path,
                error = %e,
                error_code = pulse_core::PulseError::error_code(&e)
            );
            Err(e.into())
        }
    }
}

/// Poll until interrupted. A confirmed recovery after connection loss tears
/// the engine down and builds a fresh one.
async fn watch(
    config: PulseConfig,
    options: WatchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = Arc::new(options);

    loop {
        let (reinit_tx, mut reinit_rx) = mpsc::unbounded_channel();
        let engine = Engine::from_config(&config, build_transport(&config)?);
        engine.set_recovery(Arc::new(WatchRecovery {
            client: engine.client().clone(),
            path: options.path.clone(),
            reinit: reinit_tx,
        }));
        spawn_banner(&engine);

        let view = engine.view("watch")?;
        start_poller(&engine, &view, &config, Arc::clone(&options));

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(event = "cli.watch.signal_failed", error = %e);
                }
                info!(event = "cli.watch.interrupted");
                engine.shutdown();
                return Ok(());
            }
            _ = reinit_rx.recv() => {
                info!(event = "cli.watch.reinitializing");
                engine.shutdown();
            }
        }
    }
}

fn start_poller(engine: &Engine, view: &Scope, config: &PulseConfig, options: Arc<WatchOptions>) {
    let client = engine.client().clone();
    let group = view.group().clone();
    let fetch_options = Arc::clone(&options);

    let poller = engine.poller(view, move |previous: Option<Value>| {
        let url = request_url(&fetch_options, previous.as_ref());
        let request = Request::get(url).in_group(group.clone());
        let client = client.clone();
        async move { client.send(request).await.map(|response| response.body) }
    });

    if options.long_poll {
        poller.set_interval(IntervalPolicy::Immediate);
    } else {
        poller.set_interval(config.poll.interval());
    }

    let json = options.json;
    poller
        .subscribe(move |update| match update {
            PollUpdate::Value { current, previous } => {
                if previous != Some(current) {
                    print_value(current, json);
                }
            }
            PollUpdate::Error(e) if e.is_connectivity() => {
                debug!(event = "cli.watch.poll_unreachable", error = %e);
            }
            PollUpdate::Error(e) => {
                eprintln!("{}", render::timestamped(&format!("❌ {}", e)));
            }
        })
        .cycle();
}

/// Long-poll requests carry the previous etag so the server holds the
/// request until something changes.
fn request_url(options: &WatchOptions, previous: Option<&Value>) -> String {
    let etag = previous
        .filter(|_| options.long_poll)
        .and_then(|body| body.get("etag"))
        .and_then(Value::as_str);

    match etag {
        Some(etag) => {
            let separator = if options.path.contains('?') { '&' } else { '?' };
            format!(
                "{}{}etag={}&waitChange={}",
                options.path, separator, etag, LONG_POLL_WAIT_MS
            )
        }
        None => options.path.clone(),
    }
}

fn print_value(body: &Value, json: bool) {
    if json {
        println!("{}", body);
    } else {
        println!("{}", render::timestamped(&render::summarize(body)));
    }
}

fn spawn_banner(engine: &Engine) {
    let mut rx = engine.monitor().subscribe();
    let token = engine.root_scope().token();

    tokio::spawn(async move {
        let mut previous = rx.borrow_and_update().clone();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = rx.borrow_and_update().clone();
                    if let Some(line) = render::banner(Some(&previous), &current) {
                        eprintln!("{}", render::timestamped(&line));
                    }
                    previous = current;
                }
            }
        }
    });
}

struct WatchRecovery {
    client: RequestClient,
    path: String,
    reinit: mpsc::UnboundedSender<()>,
}

impl Recovery for WatchRecovery {
    fn reload_view(&self) -> BoxFuture<'static, Result<(), FetchError>> {
        let client = self.client.clone();
        let path = self.path.clone();
        Box::pin(async move { client.get(&path).await.map(|_| ()) })
    }

    fn hard_reload(&self) {
        if self.reinit.send(()).is_err() {
            warn!(event = "cli.watch.reinit_dropped");
        }
    }
}
